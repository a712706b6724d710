//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (tracking for graceful shutdown)
//!     → handler.rs (read one request, submit, acknowledge, close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked so shutdown can wait for pending acknowledgements
//! - The handler is generic over the stream, so it can be driven in memory

pub mod connection;
pub mod handler;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use handler::{ConnectionHandler, HandleError};
pub use listener::{ConnectionPermit, Listener, ListenerError};
