use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::ActionKind;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), SessionError>`].
///
/// None of these errors is fatal to a session: every failing call can be retried once the
/// condition that caused it clears.
///
/// [`Result<(), SessionError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// You made an invalid request, usually by passing out-of-range configuration values.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        kind: InvalidRequestKind,
    },
    /// A submission is already in flight. Only one submission may be pending at a time.
    SubmissionPending {
        /// The action kind of the submission that is still pending.
        kind: ActionKind,
    },
    /// The requested action kind is still cooling down according to the last server-supplied cooldown map.
    CoolingDown {
        /// The action kind that was requested.
        kind: ActionKind,
        /// Whole seconds until the action becomes available again.
        remaining_secs: u64,
    },
    /// Actions cannot be submitted before the server announced the session start.
    NotStarted,
    /// The client never bound its transport (a duplicate initialization left it unbound).
    NotBound,
    /// The embedded session context could not be parsed.
    MalformedContext {
        /// A description of what was wrong with the context.
        context: String,
    },
    /// An inbound event payload could not be decoded at all.
    Decode {
        /// The wire name of the event.
        event: String,
        /// A description of the decoding failure.
        context: String,
    },
    /// The transport rejected an operation.
    Transport {
        /// A description of the transport error.
        context: String,
    },
}

/// Structured reasons for [`SessionError::InvalidRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidRequestKind {
    /// A numeric configuration value was outside of its allowed range.
    ConfigValueOutOfRange {
        /// The name of the offending field.
        field: &'static str,
        /// Smallest allowed value.
        min: u64,
        /// Largest allowed value.
        max: u64,
        /// The value that was supplied.
        actual: u64,
    },
    /// A duration configuration value was outside of its allowed range.
    DurationConfigOutOfRange {
        /// The name of the offending field.
        field: &'static str,
        /// Smallest allowed value in milliseconds.
        min_ms: u64,
        /// Largest allowed value in milliseconds.
        max_ms: u64,
        /// The value that was supplied, in milliseconds.
        actual_ms: u64,
    },
    /// The session has been finalized; no further actions are accepted.
    SessionFinished,
    /// The hotkey index does not map to an action kind.
    UnknownHotkey {
        /// The index that was pressed.
        index: usize,
    },
}

impl Display for InvalidRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigValueOutOfRange {
                field,
                min,
                max,
                actual,
            } => write!(
                f,
                "{} must be between {} and {}, got {}",
                field, min, max, actual
            ),
            Self::DurationConfigOutOfRange {
                field,
                min_ms,
                max_ms,
                actual_ms,
            } => write!(
                f,
                "{} must be between {}ms and {}ms, got {}ms",
                field, min_ms, max_ms, actual_ms
            ),
            Self::SessionFinished => write!(f, "the session has already ended"),
            Self::UnknownHotkey { index } => {
                write!(f, "hotkey {} is not bound to an action", index)
            },
        }
    }
}

impl From<InvalidRequestKind> for SessionError {
    fn from(kind: InvalidRequestKind) -> Self {
        Self::InvalidRequest { kind }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidRequest { kind } => {
                write!(f, "Invalid Request: {}", kind)
            },
            SessionError::SubmissionPending { kind } => {
                write!(
                    f,
                    "A '{}' submission is still pending, wait for its resolution or timeout.",
                    kind
                )
            },
            SessionError::CoolingDown {
                kind,
                remaining_secs,
            } => {
                write!(
                    f,
                    "Action '{}' is cooling down for another {}s.",
                    kind, remaining_secs
                )
            },
            SessionError::NotStarted => {
                write!(f, "The session has not started yet.")
            },
            SessionError::NotBound => {
                write!(
                    f,
                    "The client is not bound to its transport; another client already owns it."
                )
            },
            SessionError::MalformedContext { context } => {
                write!(f, "Malformed session context: {}", context)
            },
            SessionError::Decode { event, context } => {
                write!(f, "Failed to decode '{}' event: {}", event, context)
            },
            SessionError::Transport { context } => {
                write!(f, "Transport error: {}", context)
            },
        }
    }
}

impl Error for SessionError {}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn cooling_down_display_names_kind_and_remaining() {
        let err = SessionError::CoolingDown {
            kind: ActionKind::Probe,
            remaining_secs: 3,
        };
        assert_eq!(
            err.to_string(),
            "Action 'probe' is cooling down for another 3s."
        );
    }

    #[test]
    fn invalid_request_kind_converts_into_session_error() {
        let err: SessionError = InvalidRequestKind::ConfigValueOutOfRange {
            field: "max_health",
            min: 1,
            max: 1000,
            actual: 0,
        }
        .into();
        assert!(matches!(
            err,
            SessionError::InvalidRequest {
                kind: InvalidRequestKind::ConfigValueOutOfRange { .. }
            }
        ));
        assert_eq!(
            err.to_string(),
            "Invalid Request: max_health must be between 1 and 1000, got 0"
        );
    }

    #[test]
    fn session_error_is_std_error() {
        fn assert_error<E: Error>(_: &E) {}
        assert_error(&SessionError::NotStarted);
    }
}
