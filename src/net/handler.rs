//! Per-connection request handling.
//!
//! Each connection carries exactly one request: read it, turn its target into
//! a destination, submit it, answer with an acknowledgement, close.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::forward::ForwardEngine;
use crate::http::{read_request, Ack, InboundRequest};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("encode acknowledgement: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("write acknowledgement: {0}")]
    Write(#[from] std::io::Error),
}

/// Turns one inbound connection into (at most) one queued task.
#[derive(Clone)]
pub struct ConnectionHandler {
    engine: Arc<ForwardEngine>,
    read_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(engine: Arc<ForwardEngine>, read_timeout: Duration) -> Self {
        Self {
            engine,
            read_timeout,
        }
    }

    /// Serve the single request on `stream` and return the acknowledgement sent.
    pub async fn handle<S>(&self, mut stream: S) -> Result<Ack, HandleError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (ack, protocol) = self.process(&mut stream).await;
        metrics::record_connection(match ack {
            Ack::Accepted { .. } => "accepted",
            Ack::Rejected { .. } => "rejected",
        });

        let response = ack.render(protocol.as_deref())?;
        stream.write_all(&response).await?;
        stream.shutdown().await?;
        Ok(ack)
    }

    /// Read, parse and submit. The protocol is returned whenever the request
    /// got far enough to declare one.
    async fn process<S>(&self, stream: &mut S) -> (Ack, Option<String>)
    where
        S: AsyncRead + Unpin,
    {
        let bytes = match read_request(stream, self.read_timeout).await {
            Ok(bytes) => bytes,
            Err(e) => return (reject(e), None),
        };

        let inbound = match InboundRequest::parse(&bytes) {
            Ok(inbound) => inbound,
            Err(e) => return (reject(e), None),
        };
        let protocol = Some(inbound.protocol.clone());

        let outbound = match inbound.into_outbound() {
            Ok(outbound) => outbound,
            Err(e) => return (reject(e), protocol),
        };

        match self.engine.submit(outbound).await {
            Ok(id) => (Ack::Accepted { id }, protocol),
            Err(e) => (reject(e), protocol),
        }
    }
}

fn reject(error: impl std::error::Error) -> Ack {
    tracing::debug!(error = %error, "Request rejected");
    Ack::Rejected {
        message: error.to_string(),
    }
}
