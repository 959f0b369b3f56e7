//! FlowGate reverse proxy.
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  FLOWGATE                     │
//!   Client request       │  ┌──────────┐   ┌────────────┐   ┌─────────┐ │
//!   ─────────────────────┼─▶│   net    │──▶│ dispatcher │──▶│ backend │─┼──▶ Backend
//!                        │  │ listener │   │            │   │ forward │ │
//!                        │  └──────────┘   └─────┬──────┘   └────┬────┘ │
//!   Client response      │                       │               │      │
//!   ◀────────────────────┼───── relay / 503 / 504◀───────────────┘      │
//!                        │                       ▼                      │
//!                        │        ┌──────────────────────────────┐      │
//!                        │        │ load_balancer + health state │      │
//!                        │        └──────────────────────────────┘      │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use flowgate::config::{load_config, validate_config, ConfigError, LogFormat, ProxyConfig};
use flowgate::lifecycle::{signals, Shutdown};
use flowgate::net::Listener;
use flowgate::observability::{logging, metrics};
use flowgate::{ProxyServer, StartupError};

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Health-aware HTTP/1.x reverse proxy", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if cli.json {
        config.observability.log_format = LogFormat::Json;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "flowgate starting");

    validate_config(&config).map_err(|errors| {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        ConfigError::Validation(errors)
    })?;

    if config.observability.metrics_enabled {
        // Validation already checked the address.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr)?;
        }
    }

    let server = ProxyServer::new(&config)?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
