//! The mutable record carried through the queue for one forwarded request.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::OutboundRequest;
use crate::task::report::TaskReport;

/// Progress of one relayed request across its forward attempts.
///
/// Records are pooled: every field is overwritten by [`TaskRecord::prepare`]
/// on acquisition and cleared by [`TaskRecord::reset`] on release, so nothing
/// leaks from one request to the next.
#[derive(Debug, Default)]
pub struct TaskRecord {
    /// Tracking id returned to the caller.
    pub id: String,
    /// When the request was submitted.
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Wall time of the most recent attempt.
    pub last_attempt_duration: Duration,
    /// Failed attempts so far.
    pub attempt_count: u32,
    pub succeeded: bool,
    /// Description of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// Request replayed on every attempt.
    pub request: Option<OutboundRequest>,
}

impl TaskRecord {
    /// Initialize every field for a freshly submitted request.
    pub fn prepare(&mut self, id: String, request: OutboundRequest, now: DateTime<Utc>) {
        self.id = id;
        self.created_at = now;
        self.last_attempt_at = None;
        self.last_attempt_duration = Duration::ZERO;
        self.attempt_count = 0;
        self.succeeded = false;
        self.last_error = None;
        self.request = Some(request);
    }

    pub fn record_success(&mut self) {
        self.succeeded = true;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String) {
        self.attempt_count += 1;
        self.last_error = Some(error);
    }

    /// True once the task succeeded or spent its retry budget.
    pub fn is_finished(&self, retry_limit: u32) -> bool {
        self.succeeded || self.attempt_count >= retry_limit
    }

    /// Clear every field, including the id.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Snapshot used for the `put`/`done` log events.
    pub fn report(&self) -> TaskReport {
        TaskReport {
            id: self.id.clone(),
            created_time: self.created_at,
            last_try_time: self.last_attempt_at,
            last_cost_time: self.last_attempt_duration.as_secs_f64(),
            success: self.succeeded,
            try_count: self.attempt_count,
            request: self
                .request
                .as_ref()
                .map(OutboundRequest::summary)
                .unwrap_or_default(),
            last_error: self.last_error.clone().unwrap_or_default(),
        }
    }
}
