use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};
use web_time::Instant;

use crate::clock::Clock;
use crate::cooldown::{ActionAffordance, CooldownTracker};
use crate::network::messages::OutboundMessage;
use crate::network::registry::SharedTransport;
use crate::render::{Cue, RenderBridge, SubmissionStatus};
use crate::sessions::config::{FeedConfig, HealthConfig, SubmissionConfig};
use crate::sessions::event_drain::EventDrain;
use crate::sessions::finalizer::{FinalizeReason, ResultFinalizer};
use crate::sessions::router::{enqueue, EventRouter, RouteContext, RouterState};
use crate::sessions::state_store::{SessionStateStore, LOCAL_ACTOR, SYSTEM_ACTOR};
use crate::sessions::submission::{
    parse_free_text, PendingSubmission, SubmissionController, SubmissionHandle,
};
use crate::telemetry::{InvariantChecker, InvariantViolation, ViolationObserver};
use crate::{
    ActionKind, InvalidRequestKind, ParticipantId, SessionContext, SessionError, SessionEvent,
};

/// A [`SessionClient`] is the participant side of one shared session.
///
/// It is driven entirely by its host: call [`poll`](Self::poll) regularly from the event
/// loop, forward user input to [`submit`](Self::submit), [`select_target`](Self::select_target)
/// and [`request_start`](Self::request_start), and drain [`events`](Self::events) afterwards.
/// Rendering goes through the [`RenderBridge`] given to the [`ClientBuilder`].
///
/// [`ClientBuilder`]: crate::ClientBuilder
pub struct SessionClient {
    context: SessionContext,
    transport: SharedTransport,
    router: EventRouter,
    store: SessionStateStore,
    submissions: SubmissionController,
    finalizer: ResultFinalizer,
    bridge: Arc<dyn RenderBridge>,
    clock: Arc<dyn Clock>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    submission_config: SubmissionConfig,

    /// Host events waiting to be drained.
    event_queue: VecDeque<SessionEvent>,
    event_queue_size: usize,

    selected_target: Option<ParticipantId>,
    next_affordance_refresh: Instant,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            context,
            transport,
            router,
            store,
            submissions,
            finalizer,
            bridge: _,
            clock: _,
            violation_observer,
            submission_config,
            event_queue,
            event_queue_size,
            selected_target,
            next_affordance_refresh: _,
        } = self;

        f.debug_struct("SessionClient")
            .field("context", context)
            .field("transport", transport)
            .field("router", router)
            .field("store", store)
            .field("submissions", submissions)
            .field("finalizer", finalizer)
            .field("has_violation_observer", &violation_observer.is_some())
            .field("submission_config", submission_config)
            .field("queued_events", &event_queue.len())
            .field("event_queue_size", event_queue_size)
            .field("selected_target", selected_target)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: SessionContext,
        transport: SharedTransport,
        bridge: Arc<dyn RenderBridge>,
        clock: Arc<dyn Clock>,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
        submission_config: SubmissionConfig,
        health_config: HealthConfig,
        feed_config: FeedConfig,
        event_queue_size: usize,
    ) -> Self {
        let mut router = EventRouter::new();
        router.bind(
            &transport,
            context.session_code(),
            violation_observer.as_ref(),
        );
        let store = SessionStateStore::new(context.session_code(), health_config, feed_config)
            .with_observer(violation_observer.clone());
        let submissions = SubmissionController::new(
            context.session_code(),
            context.local_participant_id().clone(),
            submission_config.timeout,
        );
        let next_affordance_refresh = clock.now();

        Self {
            context,
            transport,
            router,
            store,
            submissions,
            finalizer: ResultFinalizer::new(),
            bridge,
            clock,
            violation_observer,
            submission_config,
            event_queue: VecDeque::new(),
            event_queue_size,
            selected_target: None,
            next_affordance_refresh,
        }
    }

    /// Processes everything the transport received since the last call, then runs the
    /// local timers: submission expiry and the periodic affordance refresh.
    ///
    /// An unbound client first tries to bind again, which succeeds once the client that
    /// held the transport was dropped. It does nothing while the transport stays taken.
    pub fn poll(&mut self) {
        if !self
            .router
            .take_over(&self.transport, self.context.session_code())
        {
            return;
        }

        let frames = self.transport.receive_all_events();
        if !frames.is_empty() {
            trace!(count = frames.len(), "routing inbound frames");
        }
        {
            let mut cx = RouteContext {
                context: &self.context,
                store: &mut self.store,
                submissions: &mut self.submissions,
                finalizer: &mut self.finalizer,
                bridge: self.bridge.as_ref(),
                transport: &self.transport,
                observer: self.violation_observer.as_ref(),
                events: &mut self.event_queue,
                event_capacity: self.event_queue_size,
            };
            for frame in &frames {
                self.router.route_frame(frame, &mut cx);
            }
        }

        let now = self.clock.now();
        if let Some(expired) = self.submissions.expire(now) {
            self.feed(SYSTEM_ACTOR, format!("{} timed out", expired.kind));
            self.bridge
                .submission_resolved(expired.kind, SubmissionStatus::TimedOut);
            self.push_event(SessionEvent::SubmissionTimedOut {
                kind: expired.kind,
            });
            self.refresh_affordances();
        }

        if now >= self.next_affordance_refresh {
            self.refresh_affordances();
            self.next_affordance_refresh = now + self.submission_config.affordance_interval;
        }

        crate::debug_check_invariants!(self, "after poll");
    }

    /// Submits an action of `kind` against the selected target.
    ///
    /// # Errors
    /// - [`SessionError::NotBound`] if this client never bound its transport
    /// - [`SessionError::InvalidRequest`] if the session was already finalized
    /// - [`SessionError::NotStarted`] before the server announced the start
    /// - [`SessionError::SubmissionPending`] while another submission is in flight
    /// - [`SessionError::CoolingDown`] if the kind or the local participant is cooling down
    /// - [`SessionError::Transport`] if the transport rejected the message
    pub fn submit(&mut self, kind: ActionKind) -> Result<SubmissionHandle, SessionError> {
        self.send_action(kind, None)
    }

    /// Parses free text like `"probe the login form"` and submits it.
    ///
    /// A leading action word picks the kind and the rest becomes the body; anything else
    /// is submitted whole as an `exploit`. Blank input is ignored and returns `Ok(None)`.
    ///
    /// # Errors
    /// Same as [`submit`](Self::submit).
    pub fn submit_free_text(
        &mut self,
        text: &str,
    ) -> Result<Option<SubmissionHandle>, SessionError> {
        let Some((kind, body)) = parse_free_text(text) else {
            trace!("ignoring blank free text");
            return Ok(None);
        };
        self.send_action(kind, Some(&body)).map(Some)
    }

    /// Submits the kind bound to the 1-based hotkey `index`.
    ///
    /// # Errors
    /// - [`SessionError::InvalidRequest`] if no kind is bound to `index`
    /// - everything [`submit`](Self::submit) returns
    pub fn hotkey(&mut self, index: usize) -> Result<SubmissionHandle, SessionError> {
        let kind = ActionKind::from_hotkey(index)
            .ok_or(InvalidRequestKind::UnknownHotkey { index })?;
        self.send_action(kind, None)
    }

    /// Selects the target of subsequent submissions, or clears it.
    pub fn select_target(&mut self, target: Option<ParticipantId>) {
        debug!(target = ?target, "target selected");
        self.bridge.select_target(target.as_ref());
        self.selected_target = target;
    }

    /// Asks the server to start the session.
    ///
    /// Only the creator actually sends the request. Other participants get a feed line
    /// acknowledging that they are ready.
    ///
    /// # Errors
    /// - [`SessionError::NotBound`] if this client never bound its transport
    /// - [`SessionError::Transport`] if the transport rejected the message
    pub fn request_start(&mut self) -> Result<(), SessionError> {
        if !self.context.is_creator() {
            self.feed(LOCAL_ACTOR, "You are ready. Waiting for partner...");
            return Ok(());
        }
        if self.router.state() != RouterState::Bound {
            return Err(SessionError::NotBound);
        }
        let start = OutboundMessage::StartSession {
            session_code: self.context.session_code().to_owned(),
        };
        if let Err(err) = self.transport.emit(&start) {
            self.transport_failed(&err.to_string());
            return Err(err);
        }
        debug!(session_code = self.context.session_code(), "start requested");
        self.bridge.set_start_available(false);
        Ok(())
    }

    /// Returns all events that happened since last queried for events.
    /// If the number of stored events exceeds the configured queue size, the oldest
    /// events were discarded. Call this often so the host sees everything.
    ///
    /// The returned iterator drains events from the internal queue. Events are removed
    /// as they are iterated. If the iterator is dropped before being fully consumed,
    /// any remaining events are also removed.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.event_queue.drain(..))
    }

    /// The merged session state.
    #[must_use]
    pub fn state(&self) -> &SessionStateStore {
        &self.store
    }

    /// Whether this client drains its transport.
    #[must_use]
    pub fn router_state(&self) -> RouterState {
        self.router.state()
    }

    /// Whether the server announced the session start.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.router.is_started()
    }

    /// The submission in flight, if any.
    #[must_use]
    pub fn pending_submission(&self) -> Option<&PendingSubmission> {
        self.submissions.pending()
    }

    /// The currently selected target.
    #[must_use]
    pub fn selected_target(&self) -> Option<&ParticipantId> {
        self.selected_target.as_ref()
    }

    /// Whether the final summary was shown.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalizer.is_finalized()
    }

    /// Why the final summary was shown, if it was.
    #[must_use]
    pub fn finalize_reason(&self) -> Option<FinalizeReason> {
        self.finalizer.reason()
    }

    /// The session context this client was built with.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Action availability as of now, computed from the merged cooldowns.
    #[must_use]
    pub fn affordances(&self) -> Vec<ActionAffordance> {
        CooldownTracker::new(self.store.cooldowns()).affordances(
            self.context.local_participant_id(),
            self.clock.epoch_secs(),
            self.submissions.is_pending(),
        )
    }

    fn send_action(
        &mut self,
        kind: ActionKind,
        body: Option<&str>,
    ) -> Result<SubmissionHandle, SessionError> {
        if self.router.state() != RouterState::Bound {
            return Err(SessionError::NotBound);
        }
        if self.finalizer.is_finalized() {
            return Err(InvalidRequestKind::SessionFinished.into());
        }
        if !self.router.is_started() {
            return Err(SessionError::NotStarted);
        }

        let tracker = CooldownTracker::new(self.store.cooldowns());
        let result = self.submissions.submit(
            kind,
            self.selected_target.as_ref(),
            body,
            &tracker,
            self.clock.as_ref(),
            &self.transport,
        );
        match result {
            Ok(handle) => {
                self.feed(LOCAL_ACTOR, format!("Attempting: {}", kind));
                self.bridge.play_cue(Cue::Action);
                self.bridge.submission_started(kind);
                self.refresh_affordances();
                Ok(handle)
            },
            Err(err @ SessionError::Transport { .. }) => {
                self.transport_failed(&err.to_string());
                Err(err)
            },
            Err(err) => {
                trace!(%kind, %err, "submission refused");
                Err(err)
            },
        }
    }

    fn refresh_affordances(&self) {
        if self.router.is_started() {
            self.bridge.update_action_affordances(&self.affordances());
        }
    }

    fn feed(&mut self, actor: &str, message: impl Into<String>) {
        let entry = self.store.push_feed(actor, message);
        self.bridge.render_feed_entry(&entry.actor, &entry.message);
    }

    fn push_event(&mut self, event: SessionEvent) {
        enqueue(&mut self.event_queue, self.event_queue_size, event);
    }

    fn transport_failed(&mut self, message: &str) {
        self.feed(SYSTEM_ACTOR, format!("Error: {}", message));
        self.push_event(SessionEvent::TransportError {
            message: message.to_owned(),
        });
    }
}

impl InvariantChecker for SessionClient {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.event_queue.len() > self.event_queue_size {
            return Err(InvariantViolation::new(
                "SessionClient",
                "event queue exceeds its configured size",
            )
            .with_details(format!(
                "{} > {}",
                self.event_queue.len(),
                self.event_queue_size
            )));
        }
        if self.submissions.is_pending() && !self.router.is_started() {
            return Err(InvariantViolation::new(
                "SessionClient",
                "submission pending before the session started",
            ));
        }
        self.store.check_invariants()
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
    use crate::{ClientBuilder, ManualClock, MemoryTransport};
    use serde_json::json;
    use web_time::Duration;

    struct Setup {
        client: SessionClient,
        memory: MemoryTransport,
        bridge: Arc<RecordingBridge>,
        clock: ManualClock,
    }

    fn setup(is_creator: bool) -> Setup {
        let memory = MemoryTransport::new();
        let bridge = Arc::new(RecordingBridge::new());
        let clock = ManualClock::at_epoch_secs(1_700_000_000);
        let client = ClientBuilder::new(SessionContext::new("S", is_creator, "u1"))
            .with_render_bridge(bridge.clone())
            .with_clock(Arc::new(clock.clone()))
            .build(&SharedTransport::new(memory.clone()))
            .unwrap();
        Setup {
            client,
            memory,
            bridge,
            clock,
        }
    }

    fn start(s: &mut Setup) {
        s.memory.push(
            "session_started",
            json!({"participants": {"u1": "Alice", "u2": "Bob"}}),
        );
        s.client.poll();
        s.memory.take_sent();
    }

    #[test]
    fn submit_before_start_is_refused() {
        let mut s = setup(false);
        assert_eq!(
            s.client.submit(ActionKind::Probe),
            Err(SessionError::NotStarted)
        );
        assert!(s.memory.sent().is_empty());
    }

    #[test]
    fn submit_sends_and_feeds_attempt() {
        let mut s = setup(false);
        start(&mut s);
        s.client.select_target(Some(ParticipantId::new("u2")));
        let handle = s.client.submit(ActionKind::Probe).unwrap();
        assert_eq!(handle.sequence(), 0);

        let sent = s.memory.take_sent();
        assert_eq!(
            sent,
            vec![OutboundMessage::PlayAction {
                session_code: "S".to_owned(),
                action: "probe|u1|u2|2023-11-14T22:13:20.000Z".to_owned(),
            }]
        );
        let last = s.client.state().feed().back().unwrap();
        assert_eq!(last.actor, "You");
        assert_eq!(last.message, "Attempting: probe");
        assert_eq!(
            s.bridge.count(|c| matches!(c, RenderCall::Cue { cue: Cue::Action })),
            1
        );
    }

    #[test]
    fn second_submit_while_pending_is_refused() {
        let mut s = setup(false);
        start(&mut s);
        s.client.submit(ActionKind::Probe).unwrap();
        assert_eq!(
            s.client.submit(ActionKind::Exploit),
            Err(SessionError::SubmissionPending {
                kind: ActionKind::Probe
            })
        );
        assert_eq!(s.memory.sent().len(), 1);
    }

    #[test]
    fn pending_submission_times_out() {
        let mut s = setup(false);
        start(&mut s);
        s.client.submit(ActionKind::Monitor).unwrap();
        s.clock.advance(Duration::from_millis(3999));
        s.client.poll();
        assert!(s.client.pending_submission().is_some());

        s.clock.advance(Duration::from_millis(1));
        s.client.poll();
        assert!(s.client.pending_submission().is_none());
        let events: Vec<_> = s.client.events().collect();
        assert!(events.contains(&SessionEvent::SubmissionTimedOut {
            kind: ActionKind::Monitor
        }));
        assert_eq!(
            s.client.state().feed().back().unwrap().message,
            "monitor timed out"
        );
    }

    #[test]
    fn unknown_hotkey_is_invalid() {
        let mut s = setup(false);
        start(&mut s);
        assert!(matches!(
            s.client.hotkey(9),
            Err(SessionError::InvalidRequest {
                kind: InvalidRequestKind::UnknownHotkey { index: 9 }
            })
        ));
        assert!(s.client.hotkey(3).is_ok());
        assert_eq!(s.client.pending_submission().unwrap().kind, ActionKind::Sanitize);
    }

    #[test]
    fn non_creator_start_request_sends_nothing() {
        let mut s = setup(false);
        s.client.request_start().unwrap();
        assert!(s.memory.sent().is_empty());
        assert_eq!(
            s.client.state().feed().back().unwrap().message,
            "You are ready. Waiting for partner..."
        );
    }

    #[test]
    fn creator_start_request_emits_start() {
        let mut s = setup(true);
        s.client.request_start().unwrap();
        assert_eq!(
            s.memory.sent(),
            vec![OutboundMessage::StartSession {
                session_code: "S".to_owned()
            }]
        );
    }

    #[test]
    fn closed_transport_surfaces_error_event() {
        let mut s = setup(true);
        s.memory.close();
        assert!(matches!(
            s.client.request_start(),
            Err(SessionError::Transport { .. })
        ));
        let events: Vec<_> = s.client.events().collect();
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::TransportError { .. }]
        ));
    }

    #[test]
    fn affordances_refresh_on_interval() {
        let mut s = setup(false);
        start(&mut s);
        let refreshes =
            |b: &RecordingBridge| b.count(|c| matches!(c, RenderCall::Affordances { .. }));
        let before = refreshes(&s.bridge);
        s.client.poll();
        assert_eq!(refreshes(&s.bridge), before);
        s.clock.advance(Duration::from_millis(600));
        s.client.poll();
        assert_eq!(refreshes(&s.bridge), before + 1);
    }

    #[test]
    fn event_queue_drops_oldest() {
        let memory = MemoryTransport::new();
        let mut client = ClientBuilder::new(SessionContext::new("S", false, "u1"))
            .with_event_queue_size(10)
            .unwrap()
            .build(&SharedTransport::new(memory.clone()))
            .unwrap();
        for i in 0..15 {
            memory.push("error", json!({ "message": format!("e{}", i) }));
        }
        client.poll();
        let events: Vec<_> = client.events().collect();
        assert_eq!(events.len(), 10);
        assert_eq!(
            events[0],
            SessionEvent::TransportError {
                message: "e5".to_owned()
            }
        );
    }
}
