//! Waypoint (v1)
//!
//! Runs a set of line-oriented endpoints plus a directory endpoint.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ loader + validation ──▶ WaypointConfig
//!                                               │
//!                                               ▼
//!                   ┌─────────────────────── Orchestrator ───────────────────────┐
//!                   │  probe base port → registry (directory first)              │
//!                   │  for each endpoint: factory → bind → spawn accept loop     │
//!                   └───────────────┬───────────────────────────┬────────────────┘
//!                                   ▼                           ▼
//!                         list  (listing + commands)     app, motd, ... (banner)
//!                                   │
//!                    SIGINT/SIGTERM ▼
//!                         close all, in start order ──▶ aggregated errors
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use waypoint::config::{load_config, LogFormat, WaypointConfig};
use waypoint::lifecycle::signals::shutdown_signal;
use waypoint::lifecycle::{Orchestrator, ServeSettings};
use waypoint::observability::{logging, metrics};
use waypoint::server::LineServerFactory;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Serve a set of endpoints behind a directory endpoint", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to listen on (overrides `listen_host`).
    #[arg(short, long)]
    listen: Option<String>,

    /// Directory port (overrides `port`; 0 negotiates one).
    #[arg(short, long)]
    port: Option<u16>,

    /// Log output format (overrides `logging.format`).
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => WaypointConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen_host = listen;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    logging::init_logging(&config.logging)?;

    tracing::info!("waypoint v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listen_host = %config.listen_host,
        port = config.port,
        endpoints = config.endpoints.len(),
        max_connections = config.max_connections,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let factory = Arc::new(LineServerFactory::new(config.max_connections));
    let orchestrator = Orchestrator::new(ServeSettings::from(&config), config.endpoints(), factory);

    if let Err(errors) = orchestrator.serve(shutdown_signal()).await {
        tracing::error!(errors = errors.len(), "Shutdown finished with errors");
        return Err(errors.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
