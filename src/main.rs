//! API gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                       API GATEWAY                         │
//!                  │                                                           │
//!  HTTP request    │  ┌──────────┐   ┌──────────┐   ┌───────────┐              │
//!  ────────────────┼─▶│ net/tls  │──▶│   http   │──▶│ security  │              │
//!                  │  │ acceptor │   │ handlers │   │   gate    │              │
//!                  │  └──────────┘   └────┬─────┘   └───────────┘              │
//!                  │                      ▼                                    │
//!                  │               ┌─────────────┐   ┌──────────┐              │
//!                  │               │  transport  │──▶│ registry │ ◀─ coordinator│
//!                  │               │ dispatcher  │   └──────────┘              │
//!                  │               └──────┬──────┘                             │
//!                  │                      ▼                                    │
//!  HTTP response   │               ┌─────────────┐      gRPC Reverse/Do       │
//!  ◀───────────────┼───────────────│    pool     │◀────────────────────────────┼── backend
//!                  │               └─────────────┘      gRPC Reverse/Stream   │
//!                  │                                                           │
//!                  │  config · observability · resilience · lifecycle          │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::loader::load_or_default;
use api_gateway::config::watcher::ConfigWatcher;
use api_gateway::lifecycle::signals::spawn_signal_handler;
use api_gateway::net::tls::load_tls_config;
use api_gateway::observability::{logging, metrics};
use api_gateway::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "HTTP to gRPC API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/gateway.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if rustls::crypto::aws_lc_rs::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    let (config, missing) = load_or_default(&args.config)?;
    logging::init_logging(&config.observability);

    if missing {
        tracing::warn!(path = ?args.config, "config file not found, using defaults");
    }
    if args.check {
        tracing::info!(path = ?args.config, "configuration is valid");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        registry = ?config.registry.mode,
        services = config.services.len(),
        tls = config.listener.tls.is_some(),
        "api-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the whole run.
    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = if missing {
        None
    } else {
        match watcher.run() {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::error!(error = %e, "config watcher failed to start, hot reload disabled");
                None
            }
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let shutdown_rx = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    let tls = config.listener.tls.clone();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config);

    match tls {
        Some(tls) => {
            let rustls_config = load_tls_config(&tls).await?;
            server
                .run_tls(listener.into_std()?, rustls_config, config_updates, shutdown_rx)
                .await?;
        }
        None => server.run(listener, config_updates, shutdown_rx).await?,
    }

    tracing::info!("shutdown complete");
    Ok(())
}
