//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! raw TCP bytes
//!     → request.rs (chunked read, httparse, destination from request-target)
//!     → OutboundRequest (handed to the forward engine)
//!     → response.rs (hand-framed JSON acknowledgement)
//!     → written back on the same connection
//! ```

pub mod request;
pub mod response;

pub use request::{read_request, InboundRequest, OutboundRequest, RequestError};
pub use response::Ack;
