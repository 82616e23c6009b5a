//! Dispatch of inbound events.
//!
//! The router binds to one transport and turns every decoded event into a state store
//! merge plus its render side effects. At most one router is bound to a transport
//! instance at a time: a second client initialized against the same connection stays
//! [`RouterState::Unbound`] and never drains it. The bound router holds a
//! [`TransportBinding`], so dropping it lets another router bind.
//!
//! Every merge is idempotent and order-insensitive, so handlers do not assume any
//! ordering between events. An action resolved before the session start was seen is
//! merged all the same.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::network::codec;
use crate::network::messages::{
    ActionRecord, ActionResolved, ConnectResponse, InboundEvent, InboundFrame, OutboundMessage,
    SessionEnded, SessionStarted, SolutionSubmitted, StateSnapshot, UserJoined,
};
use crate::network::registry::{SharedTransport, TransportBinding};
use crate::render::{Cue, RenderBridge, SubmissionStatus};
use crate::sessions::finalizer::{FinalizeReason, ResultFinalizer};
use crate::sessions::state_store::{AuthoritativeUpdate, SessionStateStore, SYSTEM_ACTOR};
use crate::sessions::submission::{Resolution, SubmissionController};
use crate::telemetry::{
    report_to_observer, ContractViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{ActionKind, SessionContext, SessionEvent};

/// Binding state of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterState {
    /// No handlers are attached; inbound events are not drained.
    Unbound,
    /// Handlers are attached to the transport.
    Bound,
}

/// Everything a handler may touch while routing one event.
pub(crate) struct RouteContext<'a> {
    pub(crate) context: &'a SessionContext,
    pub(crate) store: &'a mut SessionStateStore,
    pub(crate) submissions: &'a mut SubmissionController,
    pub(crate) finalizer: &'a mut ResultFinalizer,
    pub(crate) bridge: &'a dyn RenderBridge,
    pub(crate) transport: &'a SharedTransport,
    pub(crate) observer: Option<&'a Arc<dyn ViolationObserver>>,
    pub(crate) events: &'a mut VecDeque<SessionEvent>,
    pub(crate) event_capacity: usize,
}

impl RouteContext<'_> {
    pub(crate) fn push_event(&mut self, event: SessionEvent) {
        enqueue(self.events, self.event_capacity, event);
    }

    pub(crate) fn feed(&mut self, actor: &str, message: impl Into<String>) {
        let entry = self.store.push_feed(actor, message);
        self.bridge.render_feed_entry(&entry.actor, &entry.message);
    }

    pub(crate) fn report(&self, violation: ContractViolation) {
        report_to_observer(
            self.observer,
            &violation.with_session(self.context.session_code()),
        );
    }

    fn refresh_panels(&self) {
        self.bridge.update_scoreboard(&self.store.scores_view());
        self.bridge.update_participant_panels(
            &self.store.participants(),
            &self.store.health_view(),
            self.store.cooldowns(),
        );
    }

    /// Surfaces a transport failure: feed line plus host event, no state change.
    pub(crate) fn transport_failed(&mut self, message: &str) {
        self.feed(SYSTEM_ACTOR, format!("Error: {}", message));
        self.push_event(SessionEvent::TransportError {
            message: message.to_owned(),
        });
    }
}

/// Appends a host event, dropping the oldest ones when the queue is full.
pub(crate) fn enqueue(events: &mut VecDeque<SessionEvent>, capacity: usize, event: SessionEvent) {
    // pop the oldest event, if the queue is full
    while events.len() >= capacity.max(1) {
        events.pop_front();
    }
    events.push_back(event);
}

/// Routes decoded events of one session to their handlers.
#[derive(Debug)]
pub struct EventRouter {
    binding: Option<TransportBinding>,
    start_offered: bool,
    started: bool,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    /// Creates an unbound router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binding: None,
            start_offered: false,
            started: false,
        }
    }

    /// Binds to `transport` unless another live router already did.
    ///
    /// A refused bind leaves the router [`RouterState::Unbound`] and reports a
    /// [`ViolationKind::Binding`] warning.
    pub fn bind(
        &mut self,
        transport: &SharedTransport,
        session_code: &str,
        observer: Option<&Arc<dyn ViolationObserver>>,
    ) -> RouterState {
        if self.state() == RouterState::Unbound && !self.take_over(transport, session_code) {
            report_to_observer(
                observer,
                &ContractViolation::new(
                    ViolationSeverity::Warning,
                    ViolationKind::Binding,
                    "transport already bound, handlers not attached again",
                    concat!(file!(), ":", line!()),
                )
                .with_session(session_code),
            );
        }
        self.state()
    }

    /// Binds to `transport` if its previous router went away. Reports nothing.
    ///
    /// Returns whether the router is bound afterwards.
    pub fn take_over(&mut self, transport: &SharedTransport, session_code: &str) -> bool {
        if let Some(binding) = &self.binding {
            return binding.is_for(transport);
        }
        self.binding = transport.try_bind();
        if self.binding.is_some() {
            debug!(session_code, "router bound");
        }
        self.binding.is_some()
    }

    /// Current binding state.
    #[must_use]
    pub fn state(&self) -> RouterState {
        if self.binding.is_some() {
            RouterState::Bound
        } else {
            RouterState::Unbound
        }
    }

    /// Whether the server announced the session start.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the start control was offered to the creator.
    #[must_use]
    pub fn start_offered(&self) -> bool {
        self.start_offered
    }

    /// Decodes and routes one raw frame. Undecodable frames are dropped; wrongly typed
    /// keys are dropped on their own and reported.
    pub(crate) fn route_frame(&mut self, frame: &InboundFrame, cx: &mut RouteContext<'_>) {
        match codec::decode_frame(frame) {
            Ok(Some(decoded)) => {
                if !decoded.rejected_keys.is_empty() {
                    cx.report(
                        ContractViolation::new(
                            ViolationSeverity::Warning,
                            ViolationKind::Payload,
                            "dropped wrongly typed payload keys",
                            concat!(file!(), ":", line!()),
                        )
                        .with_context("event", frame.name.as_str())
                        .with_context("keys", decoded.rejected_keys.join(",")),
                    );
                }
                self.route(decoded.event, cx);
            },
            Ok(None) => trace!(event = %frame.name, "ignoring unknown event"),
            Err(err) => cx.report(
                ContractViolation::new(
                    ViolationSeverity::Error,
                    ViolationKind::Payload,
                    format!("dropped undecodable event: {}", err),
                    concat!(file!(), ":", line!()),
                )
                .with_context("event", frame.name.as_str()),
            ),
        }
    }

    /// Routes one decoded event.
    pub(crate) fn route(&mut self, event: InboundEvent, cx: &mut RouteContext<'_>) {
        trace!(event = event.name(), "routing");
        match event {
            InboundEvent::Connected => self.on_connected(cx),
            InboundEvent::ConnectResponse(data) => self.on_connect_response(&data, cx),
            InboundEvent::UserJoined(data) => self.on_user_joined(&data, cx),
            InboundEvent::SessionStarted(data) => self.on_session_started(&data, cx),
            InboundEvent::ActionResolved(data) => self.on_action_resolved(&data, cx),
            InboundEvent::StateSnapshot(data) => self.on_state_snapshot(&data, cx),
            InboundEvent::SolutionSubmitted(data) => self.on_solution_submitted(&data, cx),
            InboundEvent::SessionEnded(data) => self.on_session_ended(&data, cx),
            InboundEvent::TransportError(data) => cx.transport_failed(&data.message),
        }
    }

    fn on_connected(&mut self, cx: &mut RouteContext<'_>) {
        cx.feed(SYSTEM_ACTOR, "Connected to server");
        let join = OutboundMessage::JoinSession {
            session_code: cx.context.session_code().to_owned(),
        };
        match cx.transport.emit(&join) {
            Ok(()) => cx.push_event(SessionEvent::Connected),
            Err(err) => cx.transport_failed(&err.to_string()),
        }
    }

    fn on_connect_response(&mut self, data: &ConnectResponse, cx: &mut RouteContext<'_>) {
        match data.user.as_deref() {
            Some(user) => cx.feed(SYSTEM_ACTOR, format!("Connected as {}", user)),
            None => debug!("connect_response without user"),
        }
    }

    fn on_user_joined(&mut self, data: &UserJoined, cx: &mut RouteContext<'_>) {
        let username = data.username.as_deref().unwrap_or("Someone");
        cx.feed(
            SYSTEM_ACTOR,
            format!(
                "{} joined. Participants: {}",
                username,
                data.participants.join(", ")
            ),
        );
        let lobby = cx.store.merge_lobby(&data.participants);
        debug!(username, listed = data.participants.len(), lobby, "user joined");

        if cx.context.is_creator()
            && data.participants.len() >= 2
            && !self.start_offered
            && !self.started
        {
            self.start_offered = true;
            cx.bridge.set_start_available(true);
            cx.push_event(SessionEvent::StartAvailable {
                participants: data.participants.len(),
            });
        }
    }

    fn on_session_started(&mut self, data: &SessionStarted, cx: &mut RouteContext<'_>) {
        cx.feed(SYSTEM_ACTOR, "Session started. Preparing challenge...");
        if let Some(participants) = &data.participants {
            cx.store.merge_participants(participants);
        }
        if let Some(attempts) = &data.attempts {
            cx.store.merge_attempts(attempts);
        }
        if self.start_offered {
            cx.bridge.set_start_available(false);
        }
        if !self.started {
            self.started = true;
            cx.bridge.install_action_panel(&ActionKind::ALL);
        }
        cx.bridge.render_participants(&cx.store.participants());
        cx.refresh_panels();
        cx.push_event(SessionEvent::SessionStarted {
            participants: cx.store.participant_count(),
        });
        self.check_terminal(cx);
    }

    fn on_action_resolved(&mut self, data: &ActionResolved, cx: &mut RouteContext<'_>) {
        let update = AuthoritativeUpdate {
            scores: data.scores.as_ref(),
            health: data.hp_map.as_ref(),
            cooldowns: data.cooldowns.as_ref(),
            results: data.results.as_ref(),
        };
        self.apply_record(&data.record, update, cx);
        cx.refresh_panels();
        self.check_terminal(cx);
    }

    fn on_state_snapshot(&mut self, data: &StateSnapshot, cx: &mut RouteContext<'_>) {
        let update = AuthoritativeUpdate {
            scores: data.scores.as_ref(),
            health: data.hp_map.as_ref(),
            cooldowns: data.cooldowns.as_ref(),
            results: data.results.as_ref(),
        };
        match &data.recent {
            Some(recent) => self.apply_record(recent, update, cx),
            None => cx.store.merge_authoritative(update),
        }
        cx.refresh_panels();
        self.check_terminal(cx);
    }

    fn on_solution_submitted(&mut self, data: &SolutionSubmitted, cx: &mut RouteContext<'_>) {
        cx.feed(
            SYSTEM_ACTOR,
            format!(
                "{} submitted a solution — score {}",
                data.username.as_deref().unwrap_or("Someone"),
                data.score.unwrap_or(0)
            ),
        );
        if let Some(results) = &data.results {
            cx.store.merge_results(results, true);
            cx.bridge.update_scoreboard(&cx.store.scores_view());
        }
        self.check_terminal(cx);
    }

    fn on_session_ended(&mut self, data: &SessionEnded, cx: &mut RouteContext<'_>) {
        cx.feed(SYSTEM_ACTOR, "Session ended");
        if let Some(results) = &data.results {
            cx.store.merge_results(results, true);
        }
        if let Some(health) = &data.hp_map {
            cx.store.merge_health(health);
        }
        if let Some(losers) = &data.losers {
            debug!(?losers, mode = ?data.mode, "server declared losers");
        }
        cx.refresh_panels();
        if let Some(ranking) = cx.finalizer.force(cx.store) {
            Self::show_results(ranking, FinalizeReason::Explicit, cx);
        }
    }

    /// Records an action and plays its outcome. Repeated records only merge their maps.
    fn apply_record(
        &mut self,
        record: &ActionRecord,
        update: AuthoritativeUpdate<'_>,
        cx: &mut RouteContext<'_>,
    ) {
        let Some(outcome) = cx.store.record_action(record, update) else {
            return;
        };
        cx.bridge
            .render_feed_entry(&outcome.feed.actor, &outcome.feed.message);
        cx.bridge.play_cue(if record.is_correct {
            Cue::Success
        } else {
            Cue::Failure
        });
        if let Some(actor) = &outcome.actor {
            cx.bridge
                .play_outcome_effect(record.is_correct, actor, &outcome.targets);
        }

        match cx.submissions.resolve(record) {
            Resolution::Resolved(pending) => {
                let status = if record.is_correct {
                    SubmissionStatus::Correct
                } else {
                    SubmissionStatus::Incorrect
                };
                cx.bridge.submission_resolved(pending.kind, status);
                cx.push_event(SessionEvent::SubmissionResolved {
                    kind: pending.kind,
                    is_correct: record.is_correct,
                    score: record.score(),
                });
            },
            Resolution::Late(kind) => cx.report(
                ContractViolation::new(
                    ViolationSeverity::Warning,
                    ViolationKind::Submission,
                    "resolution arrived after the submission timed out",
                    concat!(file!(), ":", line!()),
                )
                .with_context("kind", kind.as_str()),
            ),
            Resolution::Unrelated => {},
        }
    }

    fn check_terminal(&mut self, cx: &mut RouteContext<'_>) {
        if let Some(ranking) = cx.finalizer.check(cx.store) {
            Self::show_results(ranking, FinalizeReason::Elimination, cx);
        }
    }

    fn show_results(
        ranking: Vec<crate::sessions::finalizer::RankedEntry>,
        reason: FinalizeReason,
        cx: &mut RouteContext<'_>,
    ) {
        cx.bridge.show_final_results(&ranking);
        cx.feed(SYSTEM_ACTOR, "Session ended — showing results");
        cx.push_event(SessionEvent::Finalized { ranking, reason });
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
    use crate::render::{RecordingBridge, RenderCall};
    use crate::telemetry::CollectingObserver;
    use crate::{FeedConfig, HealthConfig, MemoryTransport, ParticipantId};
    use serde_json::json;
    use web_time::Duration;

    struct Harness {
        router: EventRouter,
        context: SessionContext,
        store: SessionStateStore,
        submissions: SubmissionController,
        finalizer: ResultFinalizer,
        bridge: RecordingBridge,
        memory: MemoryTransport,
        transport: SharedTransport,
        observer: Arc<dyn ViolationObserver>,
        collected: Arc<CollectingObserver>,
        events: VecDeque<SessionEvent>,
    }

    impl Harness {
        fn new(is_creator: bool) -> Self {
            let memory = MemoryTransport::new();
            let collected = Arc::new(CollectingObserver::new());
            let context = SessionContext::new("S", is_creator, "u1");
            let mut router = EventRouter::new();
            let transport = SharedTransport::new(memory.clone());
            let observer: Arc<dyn ViolationObserver> = collected.clone();
            router.bind(&transport, "S", Some(&observer));
            Self {
                router,
                store: SessionStateStore::new("S", HealthConfig::default(), FeedConfig::default())
                    .with_observer(Some(observer.clone())),
                submissions: SubmissionController::new(
                    "S",
                    ParticipantId::new("u1"),
                    Duration::from_millis(4000),
                ),
                context,
                finalizer: ResultFinalizer::new(),
                bridge: RecordingBridge::new(),
                memory,
                transport,
                observer,
                collected,
                events: VecDeque::new(),
            }
        }

        fn send(&mut self, name: &str, payload: serde_json::Value) {
            let mut cx = RouteContext {
                context: &self.context,
                store: &mut self.store,
                submissions: &mut self.submissions,
                finalizer: &mut self.finalizer,
                bridge: &self.bridge,
                transport: &self.transport,
                observer: Some(&self.observer),
                events: &mut self.events,
                event_capacity: 100,
            };
            self.router
                .route_frame(&InboundFrame::new(name, payload), &mut cx);
        }
    }

    #[test]
    fn connect_emits_join_request() {
        let mut h = Harness::new(false);
        h.send("connect", json!({}));
        assert_eq!(h.bridge.feed_messages(), ["Connected to server"]);
        assert_eq!(
            h.memory.sent(),
            [OutboundMessage::JoinSession {
                session_code: "S".to_owned()
            }]
        );
        assert_eq!(h.events.pop_front(), Some(SessionEvent::Connected));
    }

    #[test]
    fn second_bind_is_refused() {
        let h = Harness::new(false);
        let mut other = EventRouter::new();
        assert_eq!(
            other.bind(&h.transport, "S", Some(&h.observer)),
            RouterState::Unbound
        );
        crate::assert_violation!(h.collected, ViolationKind::Binding);
    }

    #[test]
    fn dropped_router_frees_the_transport() {
        let h = Harness::new(false);
        let transport = h.transport.clone();
        let observer = h.observer.clone();
        drop(h);

        let mut next = EventRouter::new();
        assert_eq!(
            next.bind(&transport, "S", Some(&observer)),
            RouterState::Bound
        );
    }

    #[test]
    fn unbound_router_takes_over_silently() {
        let h = Harness::new(false);
        let mut other = EventRouter::new();
        assert!(!other.take_over(&h.transport, "S"));
        let transport = h.transport.clone();
        drop(h);
        assert!(other.take_over(&transport, "S"));
        assert_eq!(other.state(), RouterState::Bound);
    }

    #[test]
    fn creator_unlocks_start_once() {
        let mut h = Harness::new(true);
        h.send("user_joined", json!({"username": "alice", "participants": ["alice"]}));
        assert!(h.events.is_empty());
        h.send("user_joined", json!({"username": "bob", "participants": ["alice", "bob"]}));
        h.send("user_joined", json!({"username": "bob", "participants": ["alice", "bob"]}));
        assert_eq!(
            h.bridge
                .count(|c| matches!(c, RenderCall::StartAvailable { available: true })),
            1
        );
        assert_eq!(
            h.events.pop_front(),
            Some(SessionEvent::StartAvailable { participants: 2 })
        );
        assert_eq!(
            h.bridge.feed_messages()[1],
            "bob joined. Participants: alice, bob"
        );
    }

    #[test]
    fn non_creator_never_unlocks_start() {
        let mut h = Harness::new(false);
        h.send("user_joined", json!({"username": "bob", "participants": ["alice", "bob"]}));
        assert!(!h.router.start_offered());
    }

    #[test]
    fn session_started_installs_panel_and_renders() {
        let mut h = Harness::new(false);
        h.send(
            "session_started",
            json!({"participants": {"u1": "Alice", "u2": "Bob"}, "attempts": {"u1": 11}}),
        );
        assert!(h.router.is_started());
        assert_eq!(h.store.attempts().len(), 1);
        let calls = h.bridge.calls();
        assert!(calls.contains(&RenderCall::ActionPanel {
            kinds: ActionKind::ALL.to_vec()
        }));
        assert!(calls
            .iter()
            .any(|c| matches!(c, RenderCall::Participants { participants } if participants.len() == 2)));
        crate::assert_no_violations!(h.collected);
    }

    #[test]
    fn undecodable_payload_is_reported_and_dropped() {
        let mut h = Harness::new(false);
        h.send("session_update", json!(["u1", 40]));
        crate::assert_violation!(h.collected, ViolationKind::Payload);
        assert!(h.bridge.is_empty());
    }

    #[test]
    fn wrongly_typed_key_does_not_drop_the_rest() {
        let mut h = Harness::new(false);
        h.send(
            "session_update",
            json!({"scores": {"u1": "lots"}, "hp_map": {"u1": 40}}),
        );
        assert_eq!(h.store.health(&ParticipantId::new("u1")), 40);
        let reported = h.collected.violations_of_kind(ViolationKind::Payload);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].severity, ViolationSeverity::Warning);
    }

    #[test]
    fn error_event_goes_to_feed_only() {
        let mut h = Harness::new(false);
        h.send("error", json!({"message": "Session not found"}));
        assert_eq!(h.bridge.feed_messages(), ["Error: Session not found"]);
        assert_eq!(h.store.participant_count(), 0);
        assert!(matches!(
            h.events.pop_front(),
            Some(SessionEvent::TransportError { .. })
        ));
    }

    #[test]
    fn snapshot_elimination_finalizes_once() {
        let mut h = Harness::new(false);
        h.send("session_started", json!({"participants": {"u1": "Alice", "u2": "Bob"}}));
        h.send("session_update", json!({"hp_map": {"u1": 0, "u2": 60}}));
        h.send("session_update", json!({"hp_map": {"u1": 0}}));
        assert_eq!(
            h.bridge
                .count(|c| matches!(c, RenderCall::FinalResults { .. })),
            1
        );
        assert_eq!(h.finalizer.reason(), Some(FinalizeReason::Elimination));
    }

    #[test]
    fn session_ended_forces_summary() {
        let mut h = Harness::new(false);
        h.send(
            "session_ended",
            json!({"results": {"u2": {"username": "Bob", "score": 30}}}),
        );
        let feed = h.bridge.feed_messages();
        assert_eq!(feed.first().map(String::as_str), Some("Session ended"));
        assert_eq!(
            feed.last().map(String::as_str),
            Some("Session ended — showing results")
        );
        assert_eq!(h.store.score(&ParticipantId::new("u2")), 30);
        assert_eq!(h.finalizer.reason(), Some(FinalizeReason::Explicit));
    }

    #[test]
    fn snapshot_recent_is_deduplicated_against_action_result() {
        let mut h = Harness::new(false);
        h.send("session_started", json!({"participants": {"u1": "Alice", "u2": "Bob"}}));
        let record = json!({"actor_id": "u2", "payload": "probe|u2||T", "timestamp": "T", "score": 4, "is_correct": true});
        h.send("action_result", json!({"record": record.clone()}));
        h.send("session_update", json!({"recent": record}));
        assert_eq!(h.store.score(&ParticipantId::new("u2")), 4);
        assert_eq!(
            h.bridge
                .count(|c| matches!(c, RenderCall::OutcomeEffect { .. })),
            1
        );
    }

    #[test]
    fn solution_submitted_rebuilds_scores() {
        let mut h = Harness::new(false);
        h.send(
            "solution_submitted",
            json!({"username": "bob", "score": 50, "results": {"u2": {"username": "bob", "score": 50}}}),
        );
        assert_eq!(
            h.bridge.feed_messages(),
            ["bob submitted a solution — score 50"]
        );
        assert_eq!(h.store.score(&ParticipantId::new("u2")), 50);
    }
}
