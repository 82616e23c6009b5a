//! The immutable session context embedded in the page that hosts the client.

use serde::Deserialize;

use crate::{ParticipantId, SessionError};

/// Who we are and which session we belong to.
///
/// Parsed once at initialization and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionContext {
    session_code: String,
    #[serde(default)]
    is_creator: bool,
    #[serde(default, rename = "current_user_id")]
    local_participant_id: ParticipantId,
}

impl SessionContext {
    /// Builds a context directly.
    #[must_use]
    pub fn new(
        session_code: impl Into<String>,
        is_creator: bool,
        local_participant_id: impl Into<ParticipantId>,
    ) -> Self {
        Self {
            session_code: session_code.into(),
            is_creator,
            local_participant_id: local_participant_id.into(),
        }
    }

    /// Parses the embedded `{ session_code, is_creator, current_user_id }` payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedContext`] if the text is not JSON, or if the session
    /// code is missing or blank.
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        let context: Self =
            serde_json::from_str(text).map_err(|err| SessionError::MalformedContext {
                context: err.to_string(),
            })?;
        if context.session_code.trim().is_empty() {
            return Err(SessionError::MalformedContext {
                context: "session_code is blank".to_owned(),
            });
        }
        Ok(context)
    }

    /// The session code used to address every outbound message.
    #[must_use]
    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    /// Whether the local participant created the session and may start it.
    #[must_use]
    pub fn is_creator(&self) -> bool {
        self.is_creator
    }

    /// The local participant's id.
    #[must_use]
    pub fn local_participant_id(&self) -> &ParticipantId {
        &self.local_participant_id
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

    #[test]
    fn parses_numeric_user_id() {
        let ctx = SessionContext::from_json(
            r#"{"session_code":"XYZ","is_creator":false,"current_user_id":42}"#,
        )
        .unwrap();
        assert_eq!(ctx.session_code(), "XYZ");
        assert!(!ctx.is_creator());
        assert_eq!(ctx.local_participant_id().as_str(), "42");
    }

    #[test]
    fn missing_optional_fields_default() {
        let ctx = SessionContext::from_json(r#"{"session_code":"XYZ"}"#).unwrap();
        assert!(!ctx.is_creator());
        assert!(ctx.local_participant_id().is_empty());
    }

    #[test]
    fn missing_session_code_is_malformed() {
        let err = SessionContext::from_json(r#"{"is_creator":true}"#).unwrap_err();
        assert!(matches!(err, SessionError::MalformedContext { .. }));
    }

    #[test]
    fn blank_session_code_is_malformed() {
        let err = SessionContext::from_json(r#"{"session_code":"  "}"#).unwrap_err();
        assert!(matches!(err, SessionError::MalformedContext { .. }));
    }
}
