//! Chat server
//!
//! A small chat service speaking HTTP/1.1 and WebSocket directly over TCP.
//!
//! # Architecture Overview
//!
//! ```text
//!   TCP client
//!       │
//!       ▼
//!  ┌─────────┐    ┌──────────────┐    upgrade    ┌────────────────┐
//!  │   net   │───▶│ http server  │──────────────▶│   websocket    │
//!  │listener │    │   worker     │               │ session/frames │
//!  └─────────┘    └──────┬───────┘               └───────┬────────┘
//!                        │ route                         │ broadcast
//!                        ▼                               ▼
//!                 ┌──────────────┐   ┌──────────┐  ┌────────────┐
//!                 │   routing    │──▶│ services │◀─│  registry  │
//!                 │ + route guards│  │ storage, │  └────────────┘
//!                 └──────────────┘   │  files   │
//!                                    └──────────┘
//! ```
//!
//! Cross-cutting: config (TOML), observability (tracing, Prometheus),
//! lifecycle (startup, signals, shutdown).

use std::path::PathBuf;

use clap::Parser;

use chat_server::config::{load_config, ServerConfig};
use chat_server::lifecycle;
use chat_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "chat-server")]
#[command(about = "HTTP and WebSocket chat server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chat-server starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        static_root = %config.static_files.root,
        upload_dir = %config.uploads.dir,
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

    lifecycle::run(config).await?;
    Ok(())
}
