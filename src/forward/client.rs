//! Outbound calls to destinations.
//!
//! # Design Decisions
//! - A new client is built for every attempt: destinations are arbitrary and
//!   unbounded in number, so no connection is kept or reused
//! - Every call has a deadline (`forward.request_timeout_secs`)
//! - Only the status code matters; the response body is discarded

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::http::OutboundRequest;

/// Why a single forward attempt did not produce a response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("build client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{0}")]
    Transport(#[source] reqwest::Error),

    #[error("task has no request to forward")]
    MissingRequest,
}

/// Performs one outbound attempt and reports the destination's status.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<StatusCode, ForwardError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    system_proxy: bool,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            system_proxy: true,
        }
    }

    /// Whether `HTTP_PROXY`-style environment variables are honored.
    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.system_proxy = enabled;
        self
    }

    fn client(&self) -> Result<reqwest::Client, ForwardError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(0);
        if !self.system_proxy {
            builder = builder.no_proxy();
        }
        builder.build().map_err(ForwardError::Client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<StatusCode, ForwardError> {
        let response = self
            .client()?
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(ForwardError::Transport)?;

        Ok(response.status())
    }
}
