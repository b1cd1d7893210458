//! katmon - KATCP telemetry aggregator entry point.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregate sensor telemetry from correlator CMC servers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "KATMON_CONFIG",
        default_value = "config/default.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = katmon::AppConfig::from_file(&args.config)?;
    katmon_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting katmon v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %args.config,
        cmcs = config.cmcs.len(),
        dashboard = config.dashboard.enabled,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
        signal.cancel();
    });

    let monitor = katmon::Monitor::new(config)?;
    monitor.run(shutdown).await?;

    Ok(())
}
