use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use waypoint_runner::config::RunnerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RunnerConfig::load().context("Failed to load configuration")?;

    waypoint_monitoring::init_logging(&config.logging())
        .context("Failed to initialize logging")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    waypoint_runner::run(config, shutdown_rx)
        .await
        .context("Runner error")?;

    info!("Runner stopped");
    Ok(())
}
