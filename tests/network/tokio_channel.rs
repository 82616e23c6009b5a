//! A client driven over the tokio channel transport.

use std::sync::Arc;

use coop_sync::prelude::*;
use coop_sync::{InboundFrame, OutboundMessage, TokioChannelTransport};
use serde_json::json;

#[tokio::test]
async fn client_round_trip_over_channels() {
    let (transport, mut peer) = TokioChannelTransport::pair();
    let shared = SharedTransport::new(transport);
    let bridge = Arc::new(RecordingBridge::new());
    let mut client = ClientBuilder::new(SessionContext::new("T1", false, "u1"))
        .with_render_bridge(bridge.clone())
        .build(&shared)
        .unwrap();

    peer.inbound
        .send(InboundFrame::new("connect", json!({})))
        .unwrap();
    client.poll();

    let join = peer.outbound.recv().await.unwrap();
    assert_eq!(
        join,
        OutboundMessage::JoinSession {
            session_code: "T1".to_owned()
        }
    );
    assert_eq!(bridge.feed_messages(), ["Connected to server"]);
}

#[tokio::test]
async fn dropped_peer_surfaces_transport_error() {
    let (transport, peer) = TokioChannelTransport::pair();
    let shared = SharedTransport::new(transport);
    let mut client = ClientBuilder::new(SessionContext::new("T2", true, "u1"))
        .build(&shared)
        .unwrap();
    drop(peer);

    assert!(matches!(
        client.request_start(),
        Err(SessionError::Transport { .. })
    ));
    assert!(client
        .events()
        .any(|e| matches!(e, SessionEvent::TransportError { .. })));
}
