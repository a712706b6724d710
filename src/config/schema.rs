//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use std::net::Ipv6Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of failed attempts before a task is given up on.
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Default queue capacity, including the slot sacrificed by the ring.
pub const DEFAULT_BUFFER_LENGTH: usize = 100;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 19999;

/// Default number of forwarding workers.
pub const DEFAULT_OUT_PARALLEL: usize = 10;

/// Root configuration for the buffer agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Failed attempts allowed per request before it is finalized as failed.
    pub retry_times: u32,

    /// Queue capacity. One slot is never used, so `buffer_length - 1`
    /// requests can wait at once.
    pub buffer_length: usize,

    /// TCP port the agent listens on.
    pub port: u16,

    /// Number of workers performing outbound calls.
    pub out_parallel: usize,

    /// Listener settings (bind host, connection limits).
    pub listener: ListenerConfig,

    /// Forwarding engine timings.
    pub forward: ForwardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retry_times: DEFAULT_RETRY_TIMES,
            buffer_length: DEFAULT_BUFFER_LENGTH,
            port: DEFAULT_PORT,
            out_parallel: DEFAULT_OUT_PARALLEL,
            listener: ListenerConfig::default(),
            forward: ForwardConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Address the listener binds to, e.g. `0.0.0.0:19999` or `[::1]:19999`.
    ///
    /// Host names are kept as-is and resolved at bind time.
    pub fn bind_address(&self) -> String {
        match self.listener.host.parse::<Ipv6Addr>() {
            Ok(ip) => format!("[{ip}]:{}", self.port),
            Err(_) => format!("{}:{}", self.listener.host, self.port),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host/interface to bind (the port lives at the top level).
    pub host: String,

    /// Maximum concurrent connection handlers (backpressure).
    pub max_connections: usize,

    /// How long a single read may wait before the request is considered complete.
    pub read_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            max_connections: 10_000,
            read_timeout_ms: 5_000,
        }
    }
}

impl ListenerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Forwarding engine timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Timeout for a single outbound request in seconds.
    pub request_timeout_secs: u64,

    /// How long a worker waits on an empty queue before re-checking for shutdown.
    pub poll_interval_ms: u64,

    /// Deadline for enqueueing a freshly submitted request.
    pub submit_timeout_ms: u64,

    /// Pause between attempts to requeue a task into a full queue.
    pub requeue_pause_ms: u64,

    /// Honor `HTTP_PROXY`-style environment variables for outbound calls.
    pub system_proxy: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            poll_interval_ms: 1_000,
            submit_timeout_ms: 1_000,
            requeue_pause_ms: 1,
            system_proxy: true,
        }
    }
}

impl ForwardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format.
    pub json: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
