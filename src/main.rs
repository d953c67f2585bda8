//! API gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                   API GATEWAY                     │
//!   Client request    │  ┌──────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ──────────────────┼─▶│admission │──▶│ routing  │──▶│ proxy / ws   │──┼──▶ Backend
//!                     │  │rate limit│   │+ health  │   │   tunnel     │  │    service
//!                     │  └──────────┘   │  gate    │   └──────────────┘  │
//!                     │                 └────▲─────┘                     │
//!                     │                      │                           │
//!                     │               ┌──────┴──────┐                    │
//!                     │               │  registry   │◀── health monitor ─┼──▶ GET /health
//!                     │               └─────────────┘                    │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use api_gateway::config::load_config;
use api_gateway::lifecycle::signals::wait_for_signal;
use api_gateway::observability::{logging, metrics};
use api_gateway::{HttpServer, Shutdown};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "API gateway for the BookNest services", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Configuration errors are reported before logging is configured.
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!("api-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
