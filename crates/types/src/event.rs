//! Structured event-log record (spec §6 "Event-log format").
//!
//! One JSON object per line: `{time, type, data?, id?}`.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Milliseconds since session start.
    pub time: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl EventRecord {
    pub fn new(time: u64, event_type: impl Into<String>) -> Self {
        Self {
            time,
            event_type: event_type.into(),
            data: None,
            id: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Serializes to one JSON-lines line, including the trailing newline.
    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).expect("EventRecord always serializes");
        s.push('\n');
        s
    }
}

/// The core event types named in spec §6; `Other` covers anything
/// worker-specific that doesn't need its own constant.
pub mod kind {
    pub const START: &str = "START";
    pub const EXIT: &str = "EXIT";
    pub const STIMMING: &str = "STIMMING";
    pub const STIM_DECISION: &str = "STIM_DECISION";
    pub const SHAM_DECISION: &str = "SHAM_DECISION";
    pub const SHAM: &str = "SHAM";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_minimal_record() {
        let rec = EventRecord::new(0, kind::START);
        assert_eq!(rec.to_line(), "{\"time\":0,\"type\":\"START\"}\n");
    }

    #[test]
    fn serializes_with_data_and_id() {
        let rec = EventRecord::new(42, kind::STIM_DECISION)
            .with_data(json!({"result": 0.3}))
            .with_id(7);
        let line = rec.to_line();
        assert!(line.contains("\"id\":7"));
        assert!(line.contains("\"result\":0.3"));
    }
}
