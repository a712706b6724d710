//! Request buffering.
//!
//! # Data Flow
//! ```text
//! connection handler ── put (bounded deadline) ──▶ BoundedQueue ── get ──▶ worker
//!                                                      ▲                    │
//!                                                      └── forced put ──────┘
//!                                                          (retry requeue)
//! ```
//!
//! # Design Decisions
//! - One lock guards the ring indices; no index is touched without it
//! - Waits are bounded by a caller-supplied deadline, so the caller owns
//!   the backpressure policy (fail fast vs. keep trying)
//! - Rejected items are handed back rather than dropped

pub mod bounded;

pub use bounded::BoundedQueue;
