//! Task event emission.
//!
//! The engine decides *when* a task is worth logging (`put` on admission,
//! `done` on finalization); an [`EventSink`] decides where it goes.

use std::fmt;

use crate::task::TaskReport;

/// Log target used by [`TracingSink`].
pub const TASK_LOG_TARGET: &str = "buffer_agent::task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// A new request entered the queue.
    Put,
    /// A request succeeded or spent its retry budget.
    Done,
}

impl TaskEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::Put => "put",
            TaskEvent::Done => "done",
        }
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for task events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent, report: &TaskReport);
}

/// Writes task events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TaskEvent, report: &TaskReport) {
        tracing::info!(
            target: TASK_LOG_TARGET,
            event = %event,
            id = %report.id,
            success = report.success,
            try_count = report.try_count,
            task = %report.to_json(),
            "[Proxy]"
        );
    }
}
