//! JSON codec for the session event stream.
//!
//! Inbound events are decoded by wire name into [`InboundEvent`]. Every payload struct
//! defaults its fields, so an event carrying only some of its keys decodes fine and
//! later merges only what is present. Top-level keys are decoded independently: a key
//! with the wrong JSON type is dropped and named in [`DecodedFrame::rejected_keys`]
//! while the rest of the event still applies. A payload is rejected as a whole only
//! when it is not an object at all.
//!
//! The module also owns the pipe-delimited action payload format:
//!
//! ```text
//! <kind>|<actorId>|<targetId>|<isoTimestamp>[|<freeText>]
//! ```
//!
//! # Examples
//!
//! ```
//! use coop_sync::network::codec::{compose_action_payload, parse_action_payload};
//! use coop_sync::{ActionKind, ParticipantId};
//!
//! let payload = compose_action_payload(
//!     ActionKind::Probe,
//!     &ParticipantId::new("u1"),
//!     None,
//!     "2024-05-01T10:00:00.000Z",
//!     Some("scan|ports"),
//! );
//! assert_eq!(payload, "probe|u1||2024-05-01T10:00:00.000Z|scan|ports");
//!
//! let parsed = parse_action_payload(&payload).unwrap();
//! assert_eq!(parsed.kind, Some(ActionKind::Probe));
//! assert!(parsed.target.is_none());
//! assert_eq!(parsed.body.as_deref(), Some("scan|ports"));
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::network::messages::{InboundEvent, InboundFrame, OutboundMessage, TransportFailure};
use crate::{ActionKind, ParticipantId, SessionError};

fn payload_of<T: DeserializeOwned + Default>(
    frame: &InboundFrame,
    rejected: &mut Vec<String>,
) -> Result<T, SessionError> {
    let map = match &frame.payload {
        Value::Null => return Ok(T::default()),
        Value::Object(map) => map,
        other => {
            return Err(SessionError::Decode {
                event: frame.name.clone(),
                context: format!("expected a JSON object, got {}", json_type(other)),
            })
        },
    };
    let whole_err = match T::deserialize(&frame.payload) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    // retry with only the keys that decode on their own
    let mut kept = Map::new();
    for (key, value) in map {
        let single = Value::Object(std::iter::once((key.clone(), value.clone())).collect());
        if T::deserialize(&single).is_ok() {
            kept.insert(key.clone(), value.clone());
        } else {
            rejected.push(key.clone());
        }
    }
    T::deserialize(&Value::Object(kept)).map_err(|_| SessionError::Decode {
        event: frame.name.clone(),
        context: whole_err.to_string(),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A decoded frame plus the top-level keys that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// The decoded event.
    pub event: InboundEvent,
    /// Keys whose values had the wrong JSON type, in key order.
    pub rejected_keys: Vec<String>,
}

/// Decodes a raw frame, dropping wrongly typed top-level keys.
///
/// Returns `Ok(None)` for event names the client does not handle.
///
/// # Errors
///
/// Returns [`SessionError::Decode`] if a known event carries a payload that is not an
/// object.
pub fn decode_frame(frame: &InboundFrame) -> Result<Option<DecodedFrame>, SessionError> {
    let mut rejected_keys = Vec::new();
    let rejected = &mut rejected_keys;
    let event = match frame.name.as_str() {
        InboundEvent::CONNECT => InboundEvent::Connected,
        InboundEvent::CONNECT_RESPONSE => {
            InboundEvent::ConnectResponse(payload_of(frame, rejected)?)
        },
        InboundEvent::USER_JOINED => InboundEvent::UserJoined(payload_of(frame, rejected)?),
        InboundEvent::SESSION_STARTED => {
            InboundEvent::SessionStarted(payload_of(frame, rejected)?)
        },
        InboundEvent::ACTION_RESULT => InboundEvent::ActionResolved(payload_of(frame, rejected)?),
        InboundEvent::SESSION_UPDATE => InboundEvent::StateSnapshot(payload_of(frame, rejected)?),
        InboundEvent::SOLUTION_SUBMITTED => {
            InboundEvent::SolutionSubmitted(payload_of(frame, rejected)?)
        },
        InboundEvent::SESSION_ENDED => InboundEvent::SessionEnded(payload_of(frame, rejected)?),
        // Socket.IO error events are sometimes a bare string.
        InboundEvent::ERROR => InboundEvent::TransportError(match &frame.payload {
            Value::String(message) => TransportFailure {
                message: message.clone(),
            },
            _ => payload_of(frame, rejected)?,
        }),
        _ => return Ok(None),
    };
    Ok(Some(DecodedFrame {
        event,
        rejected_keys,
    }))
}

/// Decodes a raw frame, discarding the list of dropped keys.
///
/// # Errors
///
/// See [`decode_frame`].
pub fn decode(frame: &InboundFrame) -> Result<Option<InboundEvent>, SessionError> {
    Ok(decode_frame(frame)?.map(|decoded| decoded.event))
}

/// Encodes an outbound message as `(event name, payload)`.
///
/// # Errors
///
/// Returns [`SessionError::Transport`] if the payload cannot be serialized.
pub fn encode(msg: &OutboundMessage) -> Result<(&'static str, Value), SessionError> {
    let payload = serde_json::to_value(msg).map_err(|err| SessionError::Transport {
        context: format!("failed to encode {}: {}", msg.event_name(), err),
    })?;
    Ok((msg.event_name(), payload))
}

/// Builds the pipe-delimited action payload.
///
/// A missing target leaves its segment empty; the body segment is only present when
/// there is a body.
#[must_use]
pub fn compose_action_payload(
    kind: ActionKind,
    actor: &ParticipantId,
    target: Option<&ParticipantId>,
    timestamp: &str,
    body: Option<&str>,
) -> String {
    let target = target.map_or("", ParticipantId::as_str);
    let mut payload = format!("{}|{}|{}|{}", kind, actor, target, timestamp);
    if let Some(body) = body {
        payload.push('|');
        payload.push_str(body);
    }
    payload
}

/// A parsed action payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPayload {
    /// The kind, if the first segment names one.
    pub kind: Option<ActionKind>,
    /// The raw first segment.
    pub raw_kind: String,
    /// The actor segment.
    pub actor: Option<ParticipantId>,
    /// The target segment, `None` when empty.
    pub target: Option<ParticipantId>,
    /// The timestamp segment.
    pub timestamp: Option<String>,
    /// Everything after the fourth separator, pipes included.
    pub body: Option<String>,
}

/// Splits an action payload into its segments.
///
/// Returns `None` only for an empty payload. Shorter payloads (a bare `probe`, for
/// instance) parse with the missing segments set to `None`.
#[must_use]
pub fn parse_action_payload(payload: &str) -> Option<ActionPayload> {
    if payload.is_empty() {
        return None;
    }
    let mut parts = payload.splitn(5, '|');
    let raw_kind = parts.next().unwrap_or_default().to_owned();
    let non_empty = |segment: Option<&str>| {
        segment
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
    };
    let actor = non_empty(parts.next()).map(ParticipantId::from);
    let target = non_empty(parts.next()).map(ParticipantId::from);
    let timestamp = non_empty(parts.next());
    let body = parts.next().map(str::to_owned);
    Some(ActionPayload {
        kind: ActionKind::from_str_lenient(&raw_kind),
        raw_kind,
        actor,
        target,
        timestamp,
        body,
    })
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

    fn frame(name: &str, payload: Value) -> InboundFrame {
        InboundFrame::new(name, payload)
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert_eq!(decode(&frame("session_created", json!({}))).unwrap(), None);
    }

    #[test]
    fn null_payload_decodes_as_empty() {
        let event = decode(&frame("session_update", Value::Null)).unwrap().unwrap();
        match event {
            InboundEvent::StateSnapshot(snapshot) => {
                assert!(snapshot.scores.is_none());
                assert!(snapshot.hp_map.is_none());
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn partial_action_result_decodes() {
        let event = decode(&frame(
            "action_result",
            json!({"record": {"actor_id": "u1", "score": 5, "is_correct": true, "payload": "probe"}}),
        ))
        .unwrap()
        .unwrap();
        let InboundEvent::ActionResolved(resolved) = event else {
            panic!("expected action result");
        };
        assert_eq!(resolved.record.score(), 5);
        assert!(resolved.hp_map.is_none());
        assert!(resolved.scores.is_none());
    }

    #[test]
    fn wrongly_typed_key_is_dropped_alone() {
        let decoded = decode_frame(&frame(
            "session_update",
            json!({"scores": {"u1": "many"}, "hp_map": {"u1": 40}}),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(decoded.rejected_keys, ["scores"]);
        let InboundEvent::StateSnapshot(snapshot) = decoded.event else {
            panic!("expected snapshot");
        };
        assert!(snapshot.scores.is_none());
        assert_eq!(snapshot.hp_map.unwrap()["u1"], 40);
    }

    #[test]
    fn well_typed_payload_rejects_nothing() {
        let decoded = decode_frame(&frame("session_update", json!({"scores": {"u1": 3}})))
            .unwrap()
            .unwrap();
        assert!(decoded.rejected_keys.is_empty());
    }

    #[test]
    fn non_object_payload_is_decode_error() {
        let err = decode(&frame("user_joined", json!([1, 2]))).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn string_error_payload_becomes_message() {
        let event = decode(&frame("error", json!("Session not found"))).unwrap().unwrap();
        assert_eq!(
            event,
            InboundEvent::TransportError(TransportFailure {
                message: "Session not found".to_owned()
            })
        );
    }

    #[test]
    fn cooldowns_accept_integers_and_floats() {
        let event = decode(&frame(
            "session_update",
            json!({"cooldowns": {"u1": 1_700_000_003, "probe": 1_700_000_001.5}}),
        ))
        .unwrap()
        .unwrap();
        let InboundEvent::StateSnapshot(snapshot) = event else {
            panic!("expected snapshot");
        };
        let cooldowns = snapshot.cooldowns.unwrap();
        assert_eq!(cooldowns["u1"], 1_700_000_003.0);
        assert_eq!(cooldowns["probe"], 1_700_000_001.5);
    }

    #[test]
    fn encode_join_message() {
        let (name, payload) = encode(&OutboundMessage::JoinSession {
            session_code: "S1".to_owned(),
        })
        .unwrap();
        assert_eq!(name, "join_coop_session");
        assert_eq!(payload, json!({"session_code": "S1"}));
    }

    #[test]
    fn compose_without_body_has_four_segments() {
        let payload = compose_action_payload(
            ActionKind::Report,
            &ParticipantId::new("7"),
            Some(&ParticipantId::new("bot-1")),
            "T",
            None,
        );
        assert_eq!(payload, "report|7|bot-1|T");
    }

    #[test]
    fn parse_bare_kind() {
        let parsed = parse_action_payload("monitor").unwrap();
        assert_eq!(parsed.kind, Some(ActionKind::Monitor));
        assert!(parsed.actor.is_none());
        assert!(parsed.body.is_none());
    }

    #[test]
    fn parse_unknown_kind_keeps_raw_segment() {
        let parsed = parse_action_payload("dance|u1||T").unwrap();
        assert_eq!(parsed.kind, None);
        assert_eq!(parsed.raw_kind, "dance");
        assert_eq!(parsed.timestamp.as_deref(), Some("T"));
    }

    #[test]
    fn parse_empty_payload() {
        assert!(parse_action_payload("").is_none());
    }
}
