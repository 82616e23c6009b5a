//! Local submission discipline.
//!
//! At most one action is in flight per client. A submission stays pending until the
//! server resolves it for the local participant, or until its
//! deadline passes, whichever comes first. Expiry only restores the ability to submit:
//! a resolution that arrives afterwards is still merged into the session state by the
//! router, the controller merely notes that it came late.
//!
//! Records are matched to submissions by the payload the server echoes back, so a late
//! resolution never clears a newer submission of the same kind.

use std::collections::VecDeque;

use chrono::SecondsFormat;
use web_time::{Duration, Instant};

use crate::clock::Clock;
use crate::cooldown::CooldownTracker;
use crate::network::codec::{compose_action_payload, parse_action_payload};
use crate::network::messages::{ActionRecord, OutboundMessage};
use crate::network::registry::SharedTransport;
use crate::{ActionKind, ParticipantId, SessionError};

/// Number of expired submissions remembered for late-resolution detection.
const EXPIRED_HISTORY: usize = 8;

/// Identifies one submission of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionHandle(u64);

impl SubmissionHandle {
    /// The raw sequence number. Handles of one client increase monotonically.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// The in-flight submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    /// Handle returned by [`SubmissionController::submit`].
    pub handle: SubmissionHandle,
    /// Kind of the action.
    pub kind: ActionKind,
    /// Selected target at submission time.
    pub target: Option<ParticipantId>,
    /// The payload that was sent.
    pub payload: String,
    /// When the message was sent.
    pub submitted_at: Instant,
    /// When the submission fails locally.
    pub deadline: Instant,
}

/// What an action record meant to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The record resolves the pending submission, which is cleared.
    Resolved(PendingSubmission),
    /// The record resolves a submission that already timed out.
    Late(ActionKind),
    /// The record has nothing to do with this client's submissions.
    Unrelated,
}

/// Enforces one in-flight submission with a bounded wait.
#[derive(Debug)]
pub struct SubmissionController {
    session_code: String,
    actor: ParticipantId,
    timeout: Duration,
    pending: Option<PendingSubmission>,
    expired: VecDeque<PendingSubmission>,
    next_handle: u64,
}

impl SubmissionController {
    /// Creates a controller submitting as `actor` in `session_code`.
    #[must_use]
    pub fn new(session_code: impl Into<String>, actor: ParticipantId, timeout: Duration) -> Self {
        Self {
            session_code: session_code.into(),
            actor,
            timeout,
            pending: None,
            expired: VecDeque::new(),
            next_handle: 0,
        }
    }

    /// The pending submission, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingSubmission> {
        self.pending.as_ref()
    }

    /// Whether a submission is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Sends an action and records it as pending.
    ///
    /// The submission is only recorded once the transport accepted the message.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SubmissionPending`] if a submission is in flight
    /// - [`SessionError::CoolingDown`] if the kind or the actor is cooling down
    /// - [`SessionError::Transport`] if the transport rejected the message
    pub fn submit(
        &mut self,
        kind: ActionKind,
        target: Option<&ParticipantId>,
        body: Option<&str>,
        cooldowns: &CooldownTracker<'_>,
        clock: &dyn Clock,
        transport: &SharedTransport,
    ) -> Result<SubmissionHandle, SessionError> {
        if let Some(pending) = &self.pending {
            return Err(SessionError::SubmissionPending { kind: pending.kind });
        }
        let remaining_secs = cooldowns.remaining_for(kind, &self.actor, clock.epoch_secs());
        if remaining_secs > 0 {
            return Err(SessionError::CoolingDown {
                kind,
                remaining_secs,
            });
        }

        let timestamp = clock.wall().to_rfc3339_opts(SecondsFormat::Millis, true);
        let payload = compose_action_payload(kind, &self.actor, target, &timestamp, body);
        transport.emit(&OutboundMessage::PlayAction {
            session_code: self.session_code.clone(),
            action: payload.clone(),
        })?;

        let handle = SubmissionHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        let submitted_at = clock.now();
        tracing::debug!(%kind, handle = handle.0, "submission sent");
        self.pending = Some(PendingSubmission {
            handle,
            kind,
            target: target.cloned(),
            payload,
            submitted_at,
            deadline: submitted_at + self.timeout,
        });
        Ok(handle)
    }

    /// Matches a resolved action against the pending and recently expired submissions.
    ///
    /// The server echoes the submitted payload, so a record is first matched by payload
    /// identity: against the pending submission, then against the expired ones. A
    /// record that echoes an expired submission is [`Late`](Resolution::Late) even when
    /// a submission of the same kind is pending. Records in the full
    /// `kind|actor|target|timestamp` form match nothing else. Only free-form payloads
    /// fall back to matching by kind, pending submission first.
    pub fn resolve(&mut self, record: &ActionRecord) -> Resolution {
        if record.actor() != Some(&self.actor) {
            return Resolution::Unrelated;
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.payload == record.payload)
        {
            return self.take_resolved();
        }
        if let Some(index) = self
            .expired
            .iter()
            .position(|expired| expired.payload == record.payload)
        {
            return self.take_late(index);
        }
        if is_echoed_payload(&record.payload) {
            return Resolution::Unrelated;
        }

        if self
            .pending
            .as_ref()
            .is_some_and(|pending| names_kind(&record.payload, pending.kind))
        {
            return self.take_resolved();
        }
        if let Some(index) = self
            .expired
            .iter()
            .position(|expired| names_kind(&record.payload, expired.kind))
        {
            return self.take_late(index);
        }
        Resolution::Unrelated
    }

    fn take_resolved(&mut self) -> Resolution {
        match self.pending.take() {
            Some(pending) => {
                tracing::debug!(kind = %pending.kind, "submission resolved");
                Resolution::Resolved(pending)
            },
            None => Resolution::Unrelated,
        }
    }

    fn take_late(&mut self, index: usize) -> Resolution {
        match self.expired.remove(index) {
            Some(expired) => {
                tracing::debug!(kind = %expired.kind, "late resolution");
                Resolution::Late(expired.kind)
            },
            None => Resolution::Unrelated,
        }
    }

    /// Clears and returns the pending submission once `now` reached its deadline.
    pub fn expire(&mut self, now: Instant) -> Option<PendingSubmission> {
        if self.pending.as_ref().is_some_and(|p| now >= p.deadline) {
            let expired = self.pending.take()?;
            tracing::debug!(kind = %expired.kind, "submission timed out");
            if self.expired.len() >= EXPIRED_HISTORY {
                self.expired.pop_front();
            }
            self.expired.push_back(expired.clone());
            return Some(expired);
        }
        None
    }
}

/// Whether `payload` has the full `kind|actor|target|timestamp` form this client sends.
fn is_echoed_payload(payload: &str) -> bool {
    parse_action_payload(payload).is_some_and(|parsed| {
        parsed.kind.is_some() && parsed.actor.is_some() && parsed.timestamp.is_some()
    })
}

/// Whether an action payload names `kind`: by its first pipe segment when that is a
/// kind, otherwise by substring.
fn names_kind(payload: &str, kind: ActionKind) -> bool {
    let first = payload.split('|').next().unwrap_or_default();
    match ActionKind::from_str_lenient(first) {
        Some(named) => named == kind,
        None => payload.to_ascii_lowercase().contains(kind.as_str()),
    }
}

/// Splits typed input into an action kind and a body.
///
/// A leading word followed by more text selects the kind when it names one; anything else
/// is sent as an [`ActionKind::Exploit`] with the whole text as body. Blank input yields
/// `None`.
///
/// ```
/// use coop_sync::sessions::submission::parse_free_text;
/// use coop_sync::ActionKind;
///
/// assert_eq!(
///     parse_free_text("PROBE scan the ports"),
///     Some((ActionKind::Probe, "scan the ports".to_owned()))
/// );
/// assert_eq!(
///     parse_free_text("rm -rf /tmp/x"),
///     Some((ActionKind::Exploit, "rm -rf /tmp/x".to_owned()))
/// );
/// assert_eq!(parse_free_text("   "), None);
/// ```
#[must_use]
pub fn parse_free_text(input: &str) -> Option<(ActionKind, String)> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }
    if let Some((first, rest)) = text.split_once(char::is_whitespace) {
        if first.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Some(kind) = ActionKind::from_str_lenient(first) {
                return Some((kind, rest.trim_start().to_owned()));
            }
        }
    }
    Some((ActionKind::default(), text.to_owned()))
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
    use crate::clock::ManualClock;
    use crate::cooldown::CooldownMap;
    use crate::MemoryTransport;

    const TIMEOUT: Duration = Duration::from_millis(4000);

    struct Fixture {
        controller: SubmissionController,
        clock: ManualClock,
        memory: MemoryTransport,
        transport: SharedTransport,
        cooldowns: CooldownMap,
    }

    impl Fixture {
        fn new() -> Self {
            let memory = MemoryTransport::new();
            Self {
                controller: SubmissionController::new("S", ParticipantId::new("u1"), TIMEOUT),
                clock: ManualClock::at_epoch_secs(1_700_000_000),
                transport: SharedTransport::new(memory.clone()),
                memory,
                cooldowns: CooldownMap::new(),
            }
        }

        fn submit(&mut self, kind: ActionKind) -> Result<SubmissionHandle, SessionError> {
            self.controller.submit(
                kind,
                None,
                None,
                &CooldownTracker::new(&self.cooldowns),
                &self.clock,
                &self.transport,
            )
        }
    }

    fn record(actor: &str, payload: &str) -> ActionRecord {
        ActionRecord {
            actor_id: Some(ParticipantId::new(actor)),
            payload: payload.to_owned(),
            ..ActionRecord::default()
        }
    }

    #[test]
    fn submit_sends_pipe_payload() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        let sent = fx.memory.sent();
        assert_eq!(sent.len(), 1);
        let OutboundMessage::PlayAction {
            session_code,
            action,
        } = &sent[0]
        else {
            panic!("expected play_action");
        };
        assert_eq!(session_code, "S");
        assert_eq!(action, "probe|u1||2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn second_submit_is_refused_while_pending() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        assert_eq!(
            fx.submit(ActionKind::Exploit),
            Err(SessionError::SubmissionPending {
                kind: ActionKind::Probe
            })
        );
        assert_eq!(fx.memory.sent().len(), 1);
    }

    #[test]
    fn expiry_at_deadline_restores_capability() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        fx.clock.advance(Duration::from_millis(3999));
        assert!(fx.controller.expire(fx.clock.now()).is_none());
        fx.clock.advance(Duration::from_millis(1));
        let expired = fx.controller.expire(fx.clock.now()).unwrap();
        assert_eq!(expired.kind, ActionKind::Probe);
        assert!(fx.submit(ActionKind::Probe).is_ok());
    }

    #[test]
    fn cooling_down_kind_is_refused() {
        let mut fx = Fixture::new();
        fx.cooldowns.insert("probe".to_owned(), 1_700_000_002.5);
        assert_eq!(
            fx.submit(ActionKind::Probe),
            Err(SessionError::CoolingDown {
                kind: ActionKind::Probe,
                remaining_secs: 3
            })
        );
        assert!(fx.submit(ActionKind::Exploit).is_ok());
    }

    #[test]
    fn transport_failure_records_nothing() {
        let mut fx = Fixture::new();
        fx.memory.close();
        assert!(matches!(
            fx.submit(ActionKind::Probe),
            Err(SessionError::Transport { .. })
        ));
        assert!(!fx.controller.is_pending());
    }

    #[test]
    fn matching_record_resolves() {
        let mut fx = Fixture::new();
        let handle = fx.submit(ActionKind::Sanitize).unwrap();
        let sent = fx.controller.pending().unwrap().payload.clone();
        assert_eq!(
            fx.controller.resolve(&record("u2", &sent)),
            Resolution::Unrelated
        );
        assert_eq!(
            fx.controller.resolve(&record("u1", "probe|u1||t")),
            Resolution::Unrelated
        );
        let Resolution::Resolved(pending) = fx.controller.resolve(&record("u1", &sent)) else {
            panic!("expected resolution");
        };
        assert_eq!(pending.handle, handle);
        assert!(!fx.controller.is_pending());
    }

    #[test]
    fn echo_of_another_submission_does_not_resolve() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Sanitize).unwrap();
        assert_eq!(
            fx.controller
                .resolve(&record("u1", "sanitize|u1||2023-11-14T22:00:00.000Z")),
            Resolution::Unrelated
        );
        assert!(fx.controller.is_pending());
    }

    #[test]
    fn substring_match_for_free_form_payload() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Monitor).unwrap();
        assert!(matches!(
            fx.controller.resolve(&record("u1", "user ran Monitor on host")),
            Resolution::Resolved(_)
        ));
    }

    #[test]
    fn resolution_after_expiry_is_late() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        fx.clock.advance(TIMEOUT);
        let expired = fx.controller.expire(fx.clock.now()).unwrap();
        assert_eq!(
            fx.controller.resolve(&record("u1", &expired.payload)),
            Resolution::Late(ActionKind::Probe)
        );
        assert_eq!(
            fx.controller.resolve(&record("u1", &expired.payload)),
            Resolution::Unrelated
        );
    }

    #[test]
    fn late_echo_leaves_newer_submission_of_same_kind_pending() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        fx.clock.advance(TIMEOUT);
        let first = fx.controller.expire(fx.clock.now()).unwrap();
        fx.clock.advance(Duration::from_millis(10));
        let second = fx.submit(ActionKind::Probe).unwrap();
        let second_payload = fx.controller.pending().unwrap().payload.clone();
        assert_ne!(first.payload, second_payload);

        assert_eq!(
            fx.controller.resolve(&record("u1", &first.payload)),
            Resolution::Late(ActionKind::Probe)
        );
        assert_eq!(fx.controller.pending().map(|p| p.handle), Some(second));

        let Resolution::Resolved(pending) = fx.controller.resolve(&record("u1", &second_payload))
        else {
            panic!("expected the newer submission to resolve");
        };
        assert_eq!(pending.handle, second);
    }

    #[test]
    fn free_form_record_prefers_pending_over_expired() {
        let mut fx = Fixture::new();
        fx.submit(ActionKind::Probe).unwrap();
        fx.clock.advance(TIMEOUT);
        fx.controller.expire(fx.clock.now()).unwrap();
        fx.submit(ActionKind::Probe).unwrap();

        assert!(matches!(
            fx.controller.resolve(&record("u1", "probe")),
            Resolution::Resolved(_)
        ));
        assert_eq!(
            fx.controller.resolve(&record("u1", "probe")),
            Resolution::Late(ActionKind::Probe)
        );
    }

    #[test]
    fn handles_increase() {
        let mut fx = Fixture::new();
        let first = fx.submit(ActionKind::Probe).unwrap();
        fx.controller.resolve(&record("u1", "probe"));
        let second = fx.submit(ActionKind::Probe).unwrap();
        assert!(second > first);
    }

    #[test]
    fn free_text_single_word_goes_to_default_kind() {
        assert_eq!(
            parse_free_text("probe"),
            Some((ActionKind::Exploit, "probe".to_owned()))
        );
        assert_eq!(
            parse_free_text("  report   bot-1 is cheating "),
            Some((ActionKind::Report, "bot-1 is cheating".to_owned()))
        );
    }
}
