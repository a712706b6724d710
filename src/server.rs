//! The relay service object.
//!
//! # Responsibilities
//! - Own the listener, the forward engine and the connection bookkeeping
//! - Run the accept loop until shutdown is requested
//! - Shut down in order: stop accepting, answer pending connections, drain
//!
//! # Design Decisions
//! - No process-global state; everything hangs off a `RelayServer`
//! - Accept errors are logged and retried; only the shutdown signal ends the
//!   loop
//! - `serve` and `shutdown` take `&self` so the server can be shared via `Arc`
//!   between the accept loop and whoever triggers the shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::AgentConfig;
use crate::forward::{
    EngineError, EngineSettings, EventSink, ForwardEngine, HttpTransport, TracingSink, Transport,
};
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::net::{ConnectionHandler, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Store-and-forward relay: accepts requests, acknowledges them, forwards
/// them in the background.
pub struct RelayServer {
    listener: Listener,
    local_addr: SocketAddr,
    engine: Arc<ForwardEngine>,
    handler: ConnectionHandler,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    /// Held for as long as the accept loop runs.
    serving: Mutex<()>,
}

impl RelayServer {
    /// Bind the listener and build an engine that forwards over HTTP.
    pub async fn bind(config: &AgentConfig) -> Result<Self, ServeError> {
        let transport = HttpTransport::new(config.forward.request_timeout())
            .with_system_proxy(config.forward.system_proxy);
        Self::bind_with(config, Arc::new(transport), Arc::new(TracingSink)).await
    }

    /// Bind with a custom transport and event sink.
    pub async fn bind_with(
        config: &AgentConfig,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ServeError> {
        let listener = Listener::bind(&config.bind_address(), config.listener.max_connections).await?;
        let local_addr = listener.local_addr().map_err(ServeError::LocalAddr)?;

        let engine = Arc::new(ForwardEngine::new(
            EngineSettings::from_config(config),
            transport,
            events,
        ));
        let handler = ConnectionHandler::new(Arc::clone(&engine), config.listener.read_timeout());

        Ok(Self {
            listener,
            local_addr,
            engine,
            handler,
            tracker: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
            serving: Mutex::new(()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &Arc<ForwardEngine> {
        &self.engine
    }

    /// Start the engine and accept connections until [`RelayServer::shutdown`].
    ///
    /// Returns immediately if shutdown was already requested.
    pub async fn serve(&self) -> Result<(), ServeError> {
        let _serving = self.serving.lock().await;
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        self.engine.start().await?;
        let mut stop = self.shutdown.subscribe();

        tracing::info!(address = %self.local_addr, "Relay accepting connections");

        loop {
            tokio::select! {
                _ = shutdown::triggered(&mut stop) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit),
                    Err(e) => {
                        metrics::record_connection("error");
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    }
                },
            }
        }

        tracing::info!(address = %self.local_addr, "Relay stopped accepting connections");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let handler = self.handler.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();
            match handler.handle(stream).await {
                Ok(ack) => {
                    tracing::trace!(%connection_id, peer_addr = %peer, ?ack, "Connection answered")
                }
                Err(e) => {
                    tracing::debug!(%connection_id, peer_addr = %peer, error = %e, "Connection failed")
                }
            }
            drop(guard);
        });
    }

    /// Stop accepting, wait for pending acknowledgements, then drain the
    /// engine. Returns once every queued task is finalized.
    pub async fn shutdown(&self) {
        tracing::info!("Relay shutting down");
        self.shutdown.trigger();

        drop(self.serving.lock().await);
        self.tracker.wait_idle().await;
        self.engine.stop().await;

        tracing::info!(
            idle_records = self.engine.idle_records(),
            "Shutdown complete"
        );
    }
}
