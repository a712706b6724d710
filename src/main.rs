//! buffer-agent: a store-and-forward HTTP relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller                 ┌──────────────────────────────────────────────┐
//!     ───────────────────────┼─▶ net::listener ─▶ net::handler ──submit──┐  │
//!     ◀── ack {id} ──────────┼──────────────────────┘                    │  │
//!                            │                                           ▼  │
//!                            │                                  queue (bounded)
//!                            │                                           │  │
//!                            │                      forward workers ◀────┘  │
//!                            │                          │    ▲ requeue      │
//!                            │                          ▼    │ on failure   │
//!     Destination ◀──────────┼──────────────────── outbound call            │
//!                            └──────────────────────────────────────────────┘
//! ```
//!
//! Callers send `METHOD /http://dest/path HTTP/1.1` and get a tracking id back
//! immediately; delivery to the destination happens in the background with a
//! bounded number of retries.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use buffer_agent::config::{self, Overrides};
use buffer_agent::lifecycle::shutdown_signal;
use buffer_agent::observability::{logging, metrics};
use buffer_agent::RelayServer;

#[derive(Parser)]
#[command(name = "buffer-agent", version)]
#[command(about = "Store-and-forward HTTP relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept requests and forward them in the background
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Failed attempts allowed per request [default: 3]
    #[arg(long = "retrytimes", env = "RETRYTIMES")]
    retry_times: Option<u32>,

    /// Queue capacity, one slot is reserved [default: 100]
    #[arg(long = "bufferlength", env = "BUFFERLENGTH")]
    buffer_length: Option<usize>,

    /// Listen port [default: 19999]
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Number of forwarding workers [default: 10]
    #[arg(long = "outparallel", env = "OUTPARALLEL")]
    out_parallel: Option<usize>,

    /// TOML configuration file
    #[arg(long, env = "BUFFER_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl ServeArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            retry_times: self.retry_times,
            buffer_length: self.buffer_length,
            port: self.port,
            out_parallel: self.out_parallel,
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::resolve(args.config.as_deref(), args.overrides())?;
    logging::init(&config.observability)?;

    tracing::info!("buffer-agent v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        retry_times = config.retry_times,
        buffer_length = config.buffer_length,
        port = config.port,
        out_parallel = config.out_parallel,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Arc::new(RelayServer::bind(&config).await?);

    let watcher = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            shutdown_signal().await;
            server.shutdown().await;
        })
    };

    if let Err(e) = server.serve().await {
        watcher.abort();
        return Err(e.into());
    }
    watcher.await?;

    tracing::info!("buffer-agent exited");
    Ok(())
}
