//! JSON payload builders for server events.
//!
//! The server is loose about which keys it sends; these builders only emit the keys a
//! test asks for so that "absent" stays distinguishable from "zero".

#![allow(dead_code)] // Each integration crate only uses a subset of the fixtures.

use serde_json::{json, Map, Value};

/// A resolved action, as built by [`record`].
#[derive(Debug, Clone)]
pub struct RecordSpec {
    pub actor: String,
    pub kind: String,
    pub target: Option<String>,
    pub correct: bool,
    pub score: Option<i64>,
    pub timestamp: String,
    pub feedback: Option<String>,
    pub payload: Option<String>,
}

impl RecordSpec {
    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_owned());
        self
    }

    pub fn score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn failed(mut self) -> Self {
        self.correct = false;
        self
    }

    pub fn at(mut self, timestamp: &str) -> Self {
        self.timestamp = timestamp.to_owned();
        self
    }

    pub fn feedback(mut self, feedback: &str) -> Self {
        self.feedback = Some(feedback.to_owned());
        self
    }

    /// Uses `payload` verbatim, as the server does when it echoes a submission.
    pub fn echoing(mut self, payload: &str) -> Self {
        self.payload = Some(payload.to_owned());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("actor_id".into(), json!(self.actor));
        let payload = self.payload.clone().unwrap_or_else(|| {
            format!(
                "{}|{}|{}|{}",
                self.kind,
                self.actor,
                self.target.as_deref().unwrap_or(""),
                self.timestamp
            )
        });
        map.insert("payload".into(), json!(payload));
        map.insert("is_correct".into(), json!(self.correct));
        map.insert("timestamp".into(), json!(self.timestamp));
        if let Some(target) = &self.target {
            map.insert("target_id".into(), json!(target));
        }
        if let Some(score) = self.score {
            map.insert("score".into(), json!(score));
        }
        if let Some(feedback) = &self.feedback {
            map.insert("feedback".into(), json!(feedback));
        }
        Value::Object(map)
    }
}

/// A correct action of `kind` by `actor` with no score and no target.
pub fn record(actor: &str, kind: &str) -> RecordSpec {
    RecordSpec {
        actor: actor.to_owned(),
        kind: kind.to_owned(),
        target: None,
        correct: true,
        score: None,
        timestamp: "2023-11-14T22:13:21.000Z".to_owned(),
        feedback: None,
        payload: None,
    }
}

/// An `action_result` payload carrying only the record.
pub fn action_result(record: &RecordSpec) -> Value {
    json!({ "record": record.to_json() })
}

/// A `session_started` participants map.
pub fn participants(entries: &[(&str, &str)]) -> Value {
    let map: Map<String, Value> = entries
        .iter()
        .map(|(id, name)| ((*id).to_owned(), json!(name)))
        .collect();
    json!({ "participants": map })
}
