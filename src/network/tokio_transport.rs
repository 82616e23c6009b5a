//! Tokio channel adapter.
//!
//! The client is synchronous and poll-driven. Hosts that run their connection in a Tokio
//! task bridge it to the client with a pair of unbounded channels: the connection task
//! owns a [`TokioChannelPeer`] and forwards frames both ways, the client owns the
//! [`TokioChannelTransport`].
//!
//! # Usage Pattern
//!
//! 1. Create the pair with [`TokioChannelTransport::pair`]
//! 2. Move the peer into the task that talks to the server
//! 3. In the client loop, await [`TokioChannelTransport::readable`] and then call
//!    [`SessionClient::poll`](crate::SessionClient::poll)
//!
//! # Feature Flag
//!
//! This module requires the `tokio` feature flag.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::network::messages::{InboundFrame, OutboundMessage};
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{SessionError, Transport};

/// The client side of a channel pair.
#[derive(Debug)]
pub struct TokioChannelTransport {
    inbound: UnboundedReceiver<InboundFrame>,
    outbound: UnboundedSender<OutboundMessage>,
    /// Frames pulled by `readable()` and not yet handed to the client.
    stash: Vec<InboundFrame>,
}

/// The connection side of a channel pair.
#[derive(Debug)]
pub struct TokioChannelPeer {
    /// Send frames received from the server here.
    pub inbound: UnboundedSender<InboundFrame>,
    /// Messages the client wants delivered to the server.
    pub outbound: UnboundedReceiver<OutboundMessage>,
}

impl TokioChannelTransport {
    /// Creates a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, TokioChannelPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
                stash: Vec::new(),
            },
            TokioChannelPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    /// Waits until at least one inbound frame is available.
    ///
    /// Returns `false` once the peer is gone and nothing is left to receive.
    pub async fn readable(&mut self) -> bool {
        if !self.stash.is_empty() {
            return true;
        }
        match self.inbound.recv().await {
            Some(frame) => {
                self.stash.push(frame);
                true
            },
            None => false,
        }
    }
}

impl Transport for TokioChannelTransport {
    fn emit(&mut self, msg: &OutboundMessage) -> Result<(), SessionError> {
        self.outbound
            .send(msg.clone())
            .map_err(|err| SessionError::Transport {
                context: format!("peer dropped, could not send {}", err.0.event_name()),
            })
    }

    fn receive_all_events(&mut self) -> Vec<InboundFrame> {
        let mut frames = std::mem::take(&mut self.stash);
        loop {
            match self.inbound.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if frames.is_empty() {
                        report_violation!(
                            ViolationSeverity::Warning,
                            ViolationKind::Transport,
                            "inbound channel disconnected"
                        );
                    }
                    break;
                },
            }
        }
        frames
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut transport, mut peer) = TokioChannelTransport::pair();

        peer.inbound
            .send(InboundFrame::new("connect", json!({})))
            .unwrap();
        assert!(transport.readable().await);
        peer.inbound
            .send(InboundFrame::new("error", json!({"message": "x"})))
            .unwrap();

        let frames = transport.receive_all_events();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].name, "connect");

        transport
            .emit(&OutboundMessage::JoinSession {
                session_code: "S".to_owned(),
            })
            .unwrap();
        let sent = peer.outbound.recv().await.unwrap();
        assert_eq!(sent.event_name(), "join_coop_session");
    }

    #[tokio::test]
    async fn emit_fails_after_peer_dropped() {
        let (mut transport, peer) = TokioChannelTransport::pair();
        drop(peer);
        assert!(!transport.readable().await);
        let err = transport
            .emit(&OutboundMessage::StartSession {
                session_code: "S".to_owned(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));
    }
}
