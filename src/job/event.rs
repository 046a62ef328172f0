//! Incremental job output fragments.

use serde::{Deserialize, Serialize};

/// One fragment of a job's evolving output: a reasoning step, a progress
/// note, a discovered asset. Events accumulate in production order and are
/// never rewritten by the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Free-form classification ("rationale", "progress", "asset", ...).
    pub kind: String,
    /// Event body; shape depends on `kind`.
    pub payload: serde_json::Value,
}

impl JobEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Text carried by the event, when there is one. Accepts both a bare
    /// string payload and an object with a `text` field.
    pub fn text(&self) -> Option<&str> {
        self.payload
            .as_str()
            .or_else(|| self.payload.get("text").and_then(|v| v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_from_string_payload() {
        let event = JobEvent::new("rationale", json!("checking the table schema"));
        assert_eq!(event.text(), Some("checking the table schema"));
    }

    #[test]
    fn text_from_object_payload() {
        let event = JobEvent::new("progress", json!({"text": "scanned 3 partitions"}));
        assert_eq!(event.text(), Some("scanned 3 partitions"));
    }

    #[test]
    fn text_absent_for_other_shapes() {
        let event = JobEvent::new("asset", json!({"name": "orders", "rows": 120}));
        assert_eq!(event.text(), None);
    }
}
