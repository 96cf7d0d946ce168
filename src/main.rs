//! Busview - simulated Modbus RTU backend
//!
//! Serves the `/modbus/*` HTTP API backed by one in-process simulated bus.

use anyhow::Context;
use busview_core::{api, config::AppConfig, logging, ModbusBus};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "busview")]
#[command(author, version, about = "Simulated Modbus RTU bus with packet trace")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "BUSVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "BUSVIEW_HOST")]
    host: Option<String>,

    /// Bind port
    #[arg(short, long, env = "BUSVIEW_PORT")]
    port: Option<u16>,

    /// Fixed random seed for a reproducible bus
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.seed.is_some() {
        config.bus.seed = args.seed;
    }

    let _log_guard =
        logging::init_tracing(&config.logging).context("failed to initialize logging")?;

    info!("Starting Busview v{}", busview_core::VERSION);

    let bus = ModbusBus::with_mirror(config.bus.clone()).context("failed to start packet mirror")?;
    let app = api::create_router(bus);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
