//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! submit(OutboundRequest)
//!     → TaskPool::acquire → TaskRecord::prepare
//!     → BoundedQueue::put (bounded wait)        ── emits `put`
//!     → worker::run (N workers)
//!         → Transport::send
//!         → finished? ── yes → emits `done`, TaskPool::release
//!                     └─ no  → BoundedQueue::put (until accepted)
//! ```
//!
//! # Design Decisions
//! - A response of exactly 200 is success; anything else is a failed attempt
//! - Stopping drains the queue; in-flight calls are never cancelled
//! - Delivery is at-least-once: a destination may see a request more than
//!   once when a non-200 reply followed a side effect

pub mod client;
pub mod engine;
pub mod events;
mod worker;

pub use client::{ForwardError, HttpTransport, Transport};
pub use engine::{EngineError, EngineSettings, EngineState, ForwardEngine, SubmitError};
pub use events::{EventSink, TaskEvent, TracingSink, TASK_LOG_TARGET};
