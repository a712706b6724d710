//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_submissions_total` (counter): admissions by result (accepted, rejected)
//! - `agent_queue_depth` (gauge): tasks waiting after the last admission
//! - `agent_forward_attempts_total` (counter): outbound attempts by result
//! - `agent_forward_attempt_duration_seconds` (histogram): attempt latency
//! - `agent_tasks_done_total` (counter): finalized tasks by result (success, failed)
//! - `agent_connections_total` (counter): inbound connections by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failed"
    }
}

pub fn record_submission(accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    counter!("agent_submissions_total", "result" => result).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("agent_queue_depth").set(depth as f64);
}

pub fn record_attempt(success: bool, duration: Duration) {
    counter!("agent_forward_attempts_total", "result" => result_label(success)).increment(1);
    histogram!("agent_forward_attempt_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_done(success: bool) {
    counter!("agent_tasks_done_total", "result" => result_label(success)).increment(1);
}

/// `outcome` is one of `accepted`, `rejected` or `error`.
pub fn record_connection(outcome: &'static str) {
    counter!("agent_connections_total", "outcome" => outcome).increment(1);
}
