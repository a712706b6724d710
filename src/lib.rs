//! Store-and-forward HTTP relay library.

pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod queue;
pub mod server;
pub mod task;

pub use config::AgentConfig;
pub use forward::ForwardEngine;
pub use server::{RelayServer, ServeError};
