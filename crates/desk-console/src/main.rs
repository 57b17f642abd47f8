//! Desk operator console - Entry Point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Operator console for the trading engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DESK_CONFIG env var)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine base URL, overrides the configuration
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    desk_ws::init_crypto();

    let args = Args::parse();

    desk_telemetry::init_logging()?;

    info!("Starting desk console v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > DESK_CONFIG env var > default location
    let config_path = args
        .config
        .or_else(|| std::env::var_os("DESK_CONFIG").map(PathBuf::from));

    info!(config_path = ?config_path, "Loading configuration");
    let mut config = desk_console::AppConfig::load(config_path.as_deref())?;
    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
        config.validate()?;
    }
    info!(server_url = %config.server_url, ws_url = %config.ws_url(), "Configuration loaded");

    desk_console::run(config, config_path).await?;

    Ok(())
}
