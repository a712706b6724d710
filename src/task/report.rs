//! Serializable snapshot of a task, emitted with every `put` and `done` event.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub id: String,
    pub created_time: DateTime<Utc>,
    /// `null` until the first attempt has been made.
    pub last_try_time: Option<DateTime<Utc>>,
    /// Duration of the most recent attempt in seconds.
    pub last_cost_time: f64,
    pub success: bool,
    pub try_count: u32,
    /// `METHOD PROTOCOL URL` of the forwarded request.
    pub request: String,
    pub last_error: String,
}

impl TaskReport {
    pub fn to_json(&self) -> String {
        // Every field is a plain string, number, bool or timestamp.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"id\":{:?}}}", self.id))
    }
}
