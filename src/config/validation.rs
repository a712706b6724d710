//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (queue large enough to hold one item, workers > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::AgentConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("buffer_length must be at least 2 (got {0}); one slot is always kept free")]
    BufferTooSmall(usize),

    #[error("out_parallel must be at least 1")]
    NoWorkers,

    #[error("listener.max_connections must be at least 1")]
    NoConnections,

    #[error("forward.{0} must be greater than zero")]
    ZeroTiming(&'static str),

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// An IP literal or a syntactically valid host name.
fn is_valid_host(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok() || url::Host::parse(host).is_ok()
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.buffer_length < 2 {
        errors.push(ValidationError::BufferTooSmall(config.buffer_length));
    }
    if config.out_parallel == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }
    if config.forward.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTiming("request_timeout_secs"));
    }
    if config.forward.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroTiming("poll_interval_ms"));
    }
    if config.forward.submit_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTiming("submit_timeout_ms"));
    }
    if !is_valid_host(&config.listener.host) {
        errors.push(ValidationError::BindAddress(config.bind_address()));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
