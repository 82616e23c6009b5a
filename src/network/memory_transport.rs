//! An in-process transport.
//!
//! [`MemoryTransport`] is a pair of queues behind a shared handle: the host (or a test)
//! pushes inbound frames and inspects what the client emitted. Clones share the same
//! queues, so one clone can be handed to a [`TransportRegistry`](crate::TransportRegistry)
//! while another stays with the caller.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::network::messages::{InboundFrame, OutboundMessage};
use crate::{SessionError, Transport};

#[derive(Debug, Default)]
struct Queues {
    inbound: VecDeque<InboundFrame>,
    outbound: Vec<OutboundMessage>,
    closed: bool,
}

/// A cloneable in-memory [`Transport`].
///
/// ```
/// use coop_sync::{MemoryTransport, OutboundMessage, Transport};
///
/// let host = MemoryTransport::new();
/// let mut client_side = host.clone();
///
/// host.push("connect", serde_json::json!({}));
/// assert_eq!(client_side.receive_all_events().len(), 1);
///
/// client_side
///     .emit(&OutboundMessage::JoinSession { session_code: "S".to_owned() })
///     .unwrap();
/// assert_eq!(host.sent().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    queues: Arc<Mutex<Queues>>,
}

impl MemoryTransport {
    /// Creates an empty, open transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an inbound event.
    pub fn push(&self, name: impl Into<String>, payload: Value) {
        self.push_frame(InboundFrame::new(name, payload));
    }

    /// Queues an already-built inbound frame.
    pub fn push_frame(&self, frame: InboundFrame) {
        self.queues.lock().inbound.push_back(frame);
    }

    /// Returns every message emitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.queues.lock().outbound.clone()
    }

    /// Removes and returns every message emitted so far.
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.queues.lock().outbound)
    }

    /// Number of inbound frames not yet received.
    #[must_use]
    pub fn pending_inbound(&self) -> usize {
        self.queues.lock().inbound.len()
    }

    /// Makes every later [`emit`](Transport::emit) fail.
    pub fn close(&self) {
        self.queues.lock().closed = true;
    }
}

impl Transport for MemoryTransport {
    fn emit(&mut self, msg: &OutboundMessage) -> Result<(), SessionError> {
        let mut queues = self.queues.lock();
        if queues.closed {
            return Err(SessionError::Transport {
                context: format!("memory transport closed, dropped {}", msg.event_name()),
            });
        }
        queues.outbound.push(msg.clone());
        Ok(())
    }

    fn receive_all_events(&mut self) -> Vec<InboundFrame> {
        self.queues.lock().inbound.drain(..).collect()
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

    #[test]
    fn receive_drains_in_order() {
        let host = MemoryTransport::new();
        let mut client = host.clone();
        host.push("a", json!({}));
        host.push("b", json!({}));

        let names: Vec<String> = client
            .receive_all_events()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(host.pending_inbound(), 0);
        assert!(client.receive_all_events().is_empty());
    }

    #[test]
    fn closed_transport_rejects_emit() {
        let host = MemoryTransport::new();
        let mut client = host.clone();
        host.close();
        let err = client
            .emit(&OutboundMessage::StartSession {
                session_code: "S".to_owned(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));
        assert!(host.sent().is_empty());
    }

    #[test]
    fn take_sent_clears_outbound() {
        let host = MemoryTransport::new();
        let mut client = host.clone();
        client
            .emit(&OutboundMessage::JoinSession {
                session_code: "S".to_owned(),
            })
            .unwrap();
        assert_eq!(host.take_sent().len(), 1);
        assert!(host.sent().is_empty());
    }
}
