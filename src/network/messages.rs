use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ActionKind, CooldownMap, ParticipantId};

/// Authoritative scores keyed by participant.
pub type ScoreMap = BTreeMap<ParticipantId, i64>;
/// Authoritative health keyed by participant.
pub type HealthMap = BTreeMap<ParticipantId, i64>;
/// Per-participant result summaries.
pub type ResultsMap = BTreeMap<ParticipantId, ResultEntry>;

/// A raw event as delivered by the transport: its wire name and JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Wire name, e.g. `action_result`.
    pub name: String,
    /// Event payload. `null` is treated like an empty object.
    #[serde(default)]
    pub payload: Value,
}

impl InboundFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// One resolved action as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRecord {
    /// Who performed the action.
    pub actor_id: Option<ParticipantId>,
    /// The actor's display name at the time of the action.
    pub actor_name: Option<String>,
    /// Explicit target, if the actor picked one.
    pub target_id: Option<ParticipantId>,
    /// The submitted payload, usually `kind|actor|target|timestamp[|body]`.
    pub payload: String,
    /// Whether the server judged the action correct.
    pub is_correct: bool,
    /// Score delta awarded for the action.
    pub score: Option<i64>,
    /// Server feedback text.
    pub feedback: Option<String>,
    /// Server-side ISO-8601 timestamp.
    pub timestamp: Option<String>,
}

impl ActionRecord {
    /// The actor id, if present and not blank.
    #[must_use]
    pub fn actor(&self) -> Option<&ParticipantId> {
        self.actor_id.as_ref().filter(|id| !id.is_empty())
    }

    /// The explicit target id, if present and not blank.
    #[must_use]
    pub fn target(&self) -> Option<&ParticipantId> {
        self.target_id.as_ref().filter(|id| !id.is_empty())
    }

    /// The score delta, 0 when absent.
    #[must_use]
    pub fn score(&self) -> i64 {
        self.score.unwrap_or(0)
    }

    /// The action kind named by the payload's first pipe-delimited segment.
    #[must_use]
    pub fn action_kind(&self) -> Option<ActionKind> {
        self.payload
            .split('|')
            .next()
            .and_then(ActionKind::from_str_lenient)
    }

    /// The text shown in the event feed for this record.
    #[must_use]
    pub fn summary(&self) -> String {
        let text = self
            .feedback
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.payload);
        format!("{} (score {})", text, self.score())
    }
}

/// The latest result summary for one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultEntry {
    /// Display name.
    pub username: Option<String>,
    /// Alternate display name used by action-derived entries.
    pub actor_name: Option<String>,
    /// Whether the participant's last attempt was correct.
    pub is_correct: Option<bool>,
    /// Cumulative score.
    pub score: Option<i64>,
    /// Feedback for the last attempt.
    pub feedback: Option<String>,
}

impl ResultEntry {
    /// The display name carried by this entry, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.actor_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

/// Payload of `connect_response`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectResponse {
    /// The authenticated username.
    pub user: Option<String>,
}

/// Payload of `user_joined`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserJoined {
    /// Who joined.
    pub username: Option<String>,
    /// Everyone in the lobby, as display names.
    pub participants: Vec<String>,
}

/// Payload of `session_started`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStarted {
    /// Participant id to display name.
    pub participants: Option<BTreeMap<ParticipantId, String>>,
    /// Participant id to server attempt id. Opaque to the client.
    pub attempts: Option<BTreeMap<ParticipantId, Value>>,
}

/// Payload of `action_result`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionResolved {
    /// The resolved action.
    pub record: ActionRecord,
    /// Result summaries.
    pub results: Option<ResultsMap>,
    /// Authoritative health.
    pub hp_map: Option<HealthMap>,
    /// Authoritative cooldowns.
    pub cooldowns: Option<CooldownMap>,
    /// Authoritative scores.
    pub scores: Option<ScoreMap>,
}

/// Payload of `session_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    /// Result summaries.
    pub results: Option<ResultsMap>,
    /// Authoritative health.
    pub hp_map: Option<HealthMap>,
    /// Authoritative cooldowns.
    pub cooldowns: Option<CooldownMap>,
    /// Authoritative scores.
    pub scores: Option<ScoreMap>,
    /// The most recent action, usually already delivered through `action_result`.
    pub recent: Option<ActionRecord>,
}

/// Payload of `solution_submitted`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionSubmitted {
    /// Who submitted.
    pub username: Option<String>,
    /// Score awarded.
    pub score: Option<i64>,
    /// Whether the solution was correct.
    pub is_correct: Option<bool>,
    /// Server feedback.
    pub feedback: Option<String>,
    /// Result summaries.
    pub results: Option<ResultsMap>,
}

/// Payload of `session_ended`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEnded {
    /// Final result summaries.
    pub results: Option<ResultsMap>,
    /// Final health.
    pub hp_map: Option<HealthMap>,
    /// Participants whose health reached zero.
    pub losers: Option<Vec<ParticipantId>>,
    /// Session mode, informational.
    pub mode: Option<String>,
}

/// Payload of `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportFailure {
    /// Human-readable message.
    pub message: String,
}

/// A decoded inbound event.
///
/// # Forward Compatibility
///
/// New events may be added; always include a wildcard arm when matching.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InboundEvent {
    /// `connect`: the transport connection is established.
    Connected,
    /// `connect_response`: the server acknowledged the connection.
    ConnectResponse(ConnectResponse),
    /// `user_joined`: a participant joined the lobby.
    UserJoined(UserJoined),
    /// `session_started`: the session began.
    SessionStarted(SessionStarted),
    /// `action_result`: an action was resolved.
    ActionResolved(ActionResolved),
    /// `session_update`: a bulk state snapshot.
    StateSnapshot(StateSnapshot),
    /// `solution_submitted`: a participant submitted a full solution.
    SolutionSubmitted(SolutionSubmitted),
    /// `session_ended`: the server declared the session over.
    SessionEnded(SessionEnded),
    /// `error`: the server or transport reported an error.
    TransportError(TransportFailure),
}

impl InboundEvent {
    /// Wire name of `connect`.
    pub const CONNECT: &'static str = "connect";
    /// Wire name of `connect_response`.
    pub const CONNECT_RESPONSE: &'static str = "connect_response";
    /// Wire name of `user_joined`.
    pub const USER_JOINED: &'static str = "user_joined";
    /// Wire name of `session_started`.
    pub const SESSION_STARTED: &'static str = "session_started";
    /// Wire name of `action_result`.
    pub const ACTION_RESULT: &'static str = "action_result";
    /// Wire name of `session_update`.
    pub const SESSION_UPDATE: &'static str = "session_update";
    /// Wire name of `solution_submitted`.
    pub const SOLUTION_SUBMITTED: &'static str = "solution_submitted";
    /// Wire name of `session_ended`.
    pub const SESSION_ENDED: &'static str = "session_ended";
    /// Wire name of `error`.
    pub const ERROR: &'static str = "error";

    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => Self::CONNECT,
            Self::ConnectResponse(_) => Self::CONNECT_RESPONSE,
            Self::UserJoined(_) => Self::USER_JOINED,
            Self::SessionStarted(_) => Self::SESSION_STARTED,
            Self::ActionResolved(_) => Self::ACTION_RESULT,
            Self::StateSnapshot(_) => Self::SESSION_UPDATE,
            Self::SolutionSubmitted(_) => Self::SOLUTION_SUBMITTED,
            Self::SessionEnded(_) => Self::SESSION_ENDED,
            Self::TransportError(_) => Self::ERROR,
        }
    }
}

/// Messages the client sends to the server.
///
/// Serializes to the bare payload object; the wire event name comes from [`event_name`](Self::event_name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// `play_action { session_code, action }`.
    PlayAction {
        /// Session to act in.
        session_code: String,
        /// Pipe-delimited action payload.
        action: String,
    },
    /// `join_coop_session { session_code }`.
    JoinSession {
        /// Session to join.
        session_code: String,
    },
    /// `start_coop_session { session_code }`.
    StartSession {
        /// Session to start.
        session_code: String,
    },
}

impl OutboundMessage {
    /// Returns the wire event name of this message.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::PlayAction { .. } => "play_action",
            Self::JoinSession { .. } => "join_coop_session",
            Self::StartSession { .. } => "start_coop_session",
        }
    }

    /// The session code this message addresses.
    #[must_use]
    pub fn session_code(&self) -> &str {
        match self {
            Self::PlayAction { session_code, .. }
            | Self::JoinSession { session_code }
            | Self::StartSession { session_code } => session_code,
        }
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
    fn record_summary_prefers_feedback() {
        let record = ActionRecord {
            payload: "probe|u1||t".to_owned(),
            feedback: Some("Found an open port".to_owned()),
            score: Some(5),
            ..ActionRecord::default()
        };
        assert_eq!(record.summary(), "Found an open port (score 5)");
    }

    #[test]
    fn record_summary_falls_back_to_payload() {
        let record = ActionRecord {
            payload: "probe".to_owned(),
            feedback: Some(String::new()),
            ..ActionRecord::default()
        };
        assert_eq!(record.summary(), "probe (score 0)");
    }

    #[test]
    fn record_kind_from_pipe_payload() {
        let record = ActionRecord {
            payload: "Sanitize|u1|u2|2024-01-01T00:00:00Z".to_owned(),
            ..ActionRecord::default()
        };
        assert_eq!(record.action_kind(), Some(ActionKind::Sanitize));
    }

    #[test]
    fn record_blank_target_is_none() {
        let record: ActionRecord =
            serde_json::from_value(json!({"actor_id": 3, "target_id": ""})).unwrap();
        assert_eq!(record.actor().map(ParticipantId::as_str), Some("3"));
        assert!(record.target().is_none());
    }

    #[test]
    fn result_entry_display_name_ignores_blank() {
        let entry = ResultEntry {
            username: Some(" ".to_owned()),
            ..ResultEntry::default()
        };
        assert_eq!(entry.display_name(), None);
    }

    #[test]
    fn outbound_serializes_to_bare_payload() {
        let msg = OutboundMessage::PlayAction {
            session_code: "S".to_owned(),
            action: "probe|u1||t".to_owned(),
        };
        assert_eq!(msg.event_name(), "play_action");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"session_code": "S", "action": "probe|u1||t"})
        );
    }
}
