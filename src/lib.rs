//! # coop-sync
//!
//! Client-side synchronization for real-time cooperative/competitive challenge sessions.
//!
//! Several participants join a shared session, submit timed actions against each other and
//! watch server-authoritative scores, health and cooldowns converge to a final result. This
//! crate is the participant-side state machine: it turns the stream of server-pushed events
//! and local action requests into one consistent, re-renderable view of the session.
//!
//! The callback-style wiring of a browser client has been replaced with a request/poll
//! control flow. The host calls [`SessionClient::poll`] from its event loop, renders through
//! a [`RenderBridge`] and drains [`SessionEvent`]s with [`SessionClient::events`].
//!
//! ```
//! use coop_sync::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), SessionError> {
//! let context = SessionContext::from_json(
//!     r#"{"session_code": "ABC123", "is_creator": true, "current_user_id": 7}"#,
//! )?;
//!
//! let memory = MemoryTransport::new();
//! let mut registry = TransportRegistry::new();
//! let transport = registry.obtain(context.session_code(), || memory.clone());
//!
//! let bridge = Arc::new(RecordingBridge::new());
//! let mut client = ClientBuilder::new(context)
//!     .with_render_bridge(bridge.clone())
//!     .build(&transport)?;
//!
//! memory.push("connect", serde_json::json!({}));
//! client.poll();
//!
//! assert_eq!(client.state().feed().len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::SessionContext;
pub use cooldown::{ActionAffordance, CooldownMap, CooldownTracker};
pub use error::{InvalidRequestKind, SessionError};
pub use network::memory_transport::MemoryTransport;
pub use network::messages::{
    ActionRecord, InboundEvent, InboundFrame, OutboundMessage, ResultEntry,
};
pub use network::registry::{SharedTransport, TransportRegistry};
#[cfg(feature = "tokio")]
pub use network::tokio_transport::{TokioChannelPeer, TokioChannelTransport};
pub use render::{Cue, RecordingBridge, RenderBridge, RenderCall, SubmissionStatus, TracingBridge};
pub use sessions::builder::ClientBuilder;
pub use sessions::client::SessionClient;
pub use sessions::config::{FeedConfig, HealthConfig, SubmissionConfig};
pub use sessions::event_drain::EventDrain;
pub use sessions::finalizer::{FinalizeReason, RankedEntry, ResultFinalizer};
pub use sessions::router::{EventRouter, RouterState};
pub use sessions::state_store::{ActionOutcome, FeedEntry, SessionStateStore};
pub use sessions::submission::{PendingSubmission, SubmissionController, SubmissionHandle};

pub mod clock;
pub mod context;
pub mod cooldown;
#[doc(hidden)]
pub mod error;
pub mod prelude;
pub mod render;
pub mod telemetry;
#[doc(hidden)]
pub mod sessions {
    #[doc(hidden)]
    pub mod builder;
    #[doc(hidden)]
    pub mod client;
    pub mod config;
    #[doc(hidden)]
    pub mod event_drain;
    #[doc(hidden)]
    pub mod finalizer;
    #[doc(hidden)]
    pub mod router;
    #[doc(hidden)]
    pub mod state_store;
    #[doc(hidden)]
    pub mod submission;
}
#[doc(hidden)]
pub mod network {
    /// JSON codec for inbound events and action payload strings.
    ///
    /// Decoding is tolerant: every field is optional and a
    /// missing key decodes to "no change".
    pub mod codec;
    pub mod memory_transport;
    pub mod messages;
    pub mod registry;
    #[cfg(feature = "tokio")]
    pub mod tokio_transport;
}

/// Internal module exposing implementation details for testing, fuzzing and benchmarks.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here may change without
/// notice and is intended only for fuzz targets, property tests and benches in this
/// workspace.
#[doc(hidden)]
pub mod __internal {
    pub use crate::network::codec::{
        compose_action_payload, decode, encode, parse_action_payload, ActionPayload,
    };
    pub use crate::network::messages::{HealthMap, ResultsMap, ScoreMap};
    pub use crate::sessions::state_store::{AuthoritativeUpdate, RecordFingerprint};
}

/// Maximum number of participants kept inline when computing outcome targets.
pub const INLINE_TARGETS: usize = 4;

/// Stable identifier of a participant as assigned by the server.
///
/// The server sends ids both as JSON strings (`"bot-1"`) and as integers (`7`); both
/// deserialize into the same string form so they can be compared and used as map keys.
///
/// # Examples
///
/// ```
/// use coop_sync::ParticipantId;
///
/// let from_number: ParticipantId = serde_json::from_str("7").unwrap();
/// let from_string: ParticipantId = serde_json::from_str("\"7\"").unwrap();
/// assert_eq!(from_number, from_string);
/// assert_eq!(from_number.as_str(), "7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty id, which the server uses for "no target".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns `true` if this id belongs to a server-spawned bot participant.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.0.starts_with("bot-")
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// A known participant: a stable id plus the name shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    /// Server-assigned id.
    pub id: ParticipantId,
    /// Display name. Falls back to the id until the server names the participant.
    pub display_name: String,
}

/// The fixed set of actions a participant can submit.
///
/// Hotkeys `1`..=`5` select the kinds in declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Reconnaissance against a target.
    Probe,
    /// The default attack; also the fallback for unrecognized free text.
    #[default]
    Exploit,
    /// Clean up the actor's own surface.
    Sanitize,
    /// Watch for incoming attacks.
    Monitor,
    /// File a report on a target.
    Report,
}

impl ActionKind {
    /// All action kinds in panel order.
    pub const ALL: [Self; 5] = [
        Self::Probe,
        Self::Exploit,
        Self::Sanitize,
        Self::Monitor,
        Self::Report,
    ];

    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Exploit => "exploit",
            Self::Sanitize => "sanitize",
            Self::Monitor => "monitor",
            Self::Report => "report",
        }
    }

    /// Parses a kind case-insensitively, ignoring surrounding whitespace.
    ///
    /// ```
    /// use coop_sync::ActionKind;
    ///
    /// assert_eq!(ActionKind::from_str_lenient(" PROBE "), Some(ActionKind::Probe));
    /// assert_eq!(ActionKind::from_str_lenient("dance"), None);
    /// ```
    #[must_use]
    pub fn from_str_lenient(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(text))
    }

    /// Maps a 1-based hotkey index to its kind.
    #[must_use]
    pub fn from_hotkey(index: usize) -> Option<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    /// Returns the 1-based hotkey that selects this kind.
    #[must_use]
    pub fn hotkey(&self) -> usize {
        match self {
            Self::Probe => 1,
            Self::Exploit => 2,
            Self::Sanitize => 3,
            Self::Monitor => 4,
            Self::Report => 5,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications that you can receive from the client. Handling them is up to the host.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new event types may be
/// added in future versions. Always include a wildcard arm when matching:
///
/// ```ignore
/// match event {
///     SessionEvent::SubmissionTimedOut { kind } => { /* re-enable input */ }
///     SessionEvent::Finalized { ranking, .. } => { /* show podium */ }
///     _ => { /* handle unknown events */ }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// The transport reported an established connection and the join request went out.
    Connected,
    /// The local participant is the creator and enough participants joined to start.
    StartAvailable {
        /// Number of participants listed by the server.
        participants: usize,
    },
    /// The server started the session; actions may now be submitted.
    SessionStarted {
        /// Number of participants known after merging the start event.
        participants: usize,
    },
    /// The pending submission was resolved by the server.
    SubmissionResolved {
        /// Kind of the resolved submission.
        kind: ActionKind,
        /// Whether the server judged the action correct.
        is_correct: bool,
        /// Score delta awarded for the action.
        score: i64,
    },
    /// No resolution arrived within the submission timeout; submission capability is restored.
    SubmissionTimedOut {
        /// Kind of the expired submission.
        kind: ActionKind,
    },
    /// The final summary was shown. Emitted at most once per client.
    Finalized {
        /// Participants sorted by descending score.
        ranking: Vec<RankedEntry>,
        /// Why the session was considered finished.
        reason: FinalizeReason,
    },
    /// The transport reported an error. No state was changed.
    TransportError {
        /// The error message as sent by the server or transport.
        message: String,
    },
}

/// This [`Transport`] trait is used to plug the client into whatever carries the event stream
/// (a Socket.IO connection, a channel pair, an in-memory queue).
///
/// Delivery may be unordered and duplicated: the client tolerates both.
pub trait Transport: Send {
    /// Sends an outbound message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the message could not be handed to the connection.
    fn emit(&mut self, msg: &OutboundMessage) -> Result<(), SessionError>;

    /// This method should return all events received since the last time this method was called.
    fn receive_all_events(&mut self) -> Vec<InboundFrame>;
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn participant_id_accepts_numbers_and_strings() {
        let ids: Vec<ParticipantId> = serde_json::from_str(r#"[1, "2", "bot-3"]"#).unwrap();
        assert_eq!(ids[0].as_str(), "1");
        assert_eq!(ids[1].as_str(), "2");
        assert!(ids[2].is_bot());
        assert!(!ids[0].is_bot());
    }

    #[test]
    fn participant_id_map_lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(ParticipantId::new("u1"), 5);
        assert_eq!(map.get("u1"), Some(&5));
    }

    #[test]
    fn blank_participant_id_is_empty() {
        assert!(ParticipantId::new("  ").is_empty());
        assert!(!ParticipantId::new("u1").is_empty());
    }

    #[test]
    fn action_kind_hotkeys_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_hotkey(kind.hotkey()), Some(kind));
        }
        assert_eq!(ActionKind::from_hotkey(0), None);
        assert_eq!(ActionKind::from_hotkey(6), None);
    }

    #[test]
    fn action_kind_default_is_exploit() {
        assert_eq!(ActionKind::default(), ActionKind::Exploit);
    }

    #[test]
    fn action_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ActionKind::Sanitize).unwrap(),
            "\"sanitize\""
        );
    }
}
