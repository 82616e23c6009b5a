//! The in-memory transport as seen through a client.

use crate::common::TestClient;
use coop_sync::__internal::encode;
use coop_sync::prelude::*;
use coop_sync::{InboundFrame, OutboundMessage};
use serde_json::json;

#[test]
fn frames_are_processed_in_delivery_order() {
    let mut test = TestClient::participant();
    test.memory.push("connect", json!({}));
    test.memory.push("connect_response", json!({"user": "alice"}));
    test.memory
        .push_frame(InboundFrame::new("error", json!("Session not found")));
    test.client.poll();
    assert_eq!(
        test.feed(),
        [
            "Connected to server",
            "Connected as alice",
            "Error: Session not found"
        ]
    );
    assert_eq!(test.memory.pending_inbound(), 0);
}

#[test]
fn outbound_messages_encode_to_wire_names() {
    let mut test = TestClient::creator();
    test.deliver("connect", json!({}));
    test.client.request_start().unwrap();

    let wire: Vec<_> = test
        .sent()
        .iter()
        .map(|msg| encode(msg).unwrap())
        .collect();
    assert_eq!(wire[0].0, "join_coop_session");
    assert_eq!(wire[0].1, json!({"session_code": "ABC123"}));
    assert_eq!(wire[1].0, "start_coop_session");
}

#[test]
fn closed_connection_reports_join_failure() {
    let mut test = TestClient::participant();
    test.memory.close();
    test.deliver("connect", json!({}));
    let events = test.events();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::TransportError { .. }]
    ));
    assert!(test.sent().is_empty());
}

#[test]
fn registry_release_allows_a_fresh_binding() {
    let mut registry = TransportRegistry::new();
    let first = registry.obtain("R1", MemoryTransport::new);
    let _client = ClientBuilder::new(SessionContext::new("R1", false, "u1"))
        .build(&first)
        .unwrap();
    assert!(first.is_bound());

    assert!(registry.release("R1").is_some());
    assert!(registry.is_empty());
    let second = registry.obtain("R1", MemoryTransport::new);
    assert!(!second.same_transport(&first));
    let client = ClientBuilder::new(SessionContext::new("R1", false, "u1"))
        .build(&second)
        .unwrap();
    assert_eq!(client.router_state(), RouterState::Bound);
}

#[test]
fn play_action_payload_shape() {
    let msg = OutboundMessage::PlayAction {
        session_code: "ABC123".to_owned(),
        action: "probe|u1||T".to_owned(),
    };
    let (name, payload) = encode(&msg).unwrap();
    assert_eq!(name, "play_action");
    assert_eq!(
        payload,
        json!({"session_code": "ABC123", "action": "probe|u1||T"})
    );
}
