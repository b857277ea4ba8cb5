//! nasfeed - NAS telemetry polling and broadcast service.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Polls the NAS backend and streams telemetry to WebSocket viewers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via NASFEED_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > NASFEED_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("NASFEED_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = nasfeed_server::AppConfig::from_file(&config_path)?;
    nasfeed_telemetry::init_logging(&config.logging)?;

    info!("Starting nasfeed v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        source = ?config.source,
        rpc_url = %config.rpc.url,
        kinds = config.poller.kinds.len(),
        "Configuration loaded"
    );

    let app = nasfeed_server::Application::new(config)?;
    spawn_signal_handler(app.shutdown_token());

    app.run().await?;

    info!("nasfeed stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
