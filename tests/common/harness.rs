//! A client wired to test doubles.

#![allow(dead_code)] // Each integration crate only uses a subset of the harness.

use std::sync::Arc;

use coop_sync::prelude::*;
use coop_sync::telemetry::{CollectingObserver, ViolationObserver};
use coop_sync::{OutboundMessage, RenderCall};
use serde_json::Value;
use web_time::Duration;

use super::fixtures::participants;

/// Session code used by every harness client.
pub const SESSION_CODE: &str = "ABC123";
/// Local participant id of every harness client.
pub const LOCAL_ID: &str = "u1";
/// Wall-clock start of the manual clock (2023-11-14T22:13:20Z).
pub const EPOCH_SECS: i64 = 1_700_000_000;

/// A [`SessionClient`] plus handles on everything it talks to.
pub struct TestClient {
    pub client: SessionClient,
    pub memory: MemoryTransport,
    pub transport: SharedTransport,
    pub bridge: Arc<RecordingBridge>,
    pub clock: ManualClock,
    pub observer: Arc<CollectingObserver>,
}

impl TestClient {
    /// A participant that did not create the session.
    pub fn participant() -> Self {
        Self::build(false, |builder| builder)
    }

    /// The session creator.
    pub fn creator() -> Self {
        Self::build(true, |builder| builder)
    }

    /// A client whose builder is customized by `configure`.
    pub fn build(is_creator: bool, configure: impl FnOnce(ClientBuilder) -> ClientBuilder) -> Self {
        let memory = MemoryTransport::new();
        let transport = SharedTransport::new(memory.clone());
        Self::on_transport(is_creator, memory, transport, configure)
    }

    /// A client on an existing transport, for rebinding tests.
    pub fn on_transport(
        is_creator: bool,
        memory: MemoryTransport,
        transport: SharedTransport,
        configure: impl FnOnce(ClientBuilder) -> ClientBuilder,
    ) -> Self {
        let bridge = Arc::new(RecordingBridge::new());
        let clock = ManualClock::at_epoch_secs(EPOCH_SECS);
        let observer = Arc::new(CollectingObserver::new());
        let builder = ClientBuilder::new(SessionContext::new(SESSION_CODE, is_creator, LOCAL_ID))
            .with_render_bridge(bridge.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_violation_observer(observer.clone() as Arc<dyn ViolationObserver>);
        let client = configure(builder)
            .build(&transport)
            .expect("harness configuration is valid");
        Self {
            client,
            memory,
            transport,
            bridge,
            clock,
            observer,
        }
    }

    /// Delivers one server event and polls.
    pub fn deliver(&mut self, name: &str, payload: Value) {
        self.memory.push(name, payload);
        self.client.poll();
    }

    /// Starts the session with the local participant `u1` (Alice) and `u2` (Bob), then
    /// forgets everything recorded so far.
    pub fn started() -> Self {
        let mut test = Self::participant();
        test.start(&[(LOCAL_ID, "Alice"), ("u2", "Bob")]);
        test
    }

    /// Delivers `session_started` with the given participants and clears the recorders.
    pub fn start(&mut self, entries: &[(&str, &str)]) {
        self.deliver("session_started", participants(entries));
        self.memory.take_sent();
        self.bridge.clear();
        let _ = self.events();
    }

    /// Advances the clock and polls.
    pub fn advance_ms(&mut self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
        self.client.poll();
    }

    /// Drains the client's host events.
    pub fn events(&mut self) -> Vec<SessionEvent> {
        self.client.events().collect()
    }

    /// Everything the client sent, drained.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.memory.take_sent()
    }

    /// Feed messages in order.
    pub fn feed(&self) -> Vec<String> {
        self.client
            .state()
            .feed()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Number of recorded bridge calls matching `predicate`.
    pub fn calls(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.bridge.count(predicate)
    }

    /// Health of `id` as merged by the client.
    pub fn health(&self, id: &str) -> i64 {
        self.client.state().health(&ParticipantId::new(id))
    }

    /// Score of `id` as merged by the client.
    pub fn score(&self, id: &str) -> i64 {
        self.client.state().score(&ParticipantId::new(id))
    }
}
