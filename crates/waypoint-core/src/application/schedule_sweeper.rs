//! Periodic resumption of scheduled steps and signal timeouts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::ProcessEngine;

/// Sweeper settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often due steps are looked up
    pub poll_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Calls [`ProcessEngine::process_scheduled_steps`] on a fixed interval.
/// Missed ticks are skipped.
pub struct ScheduleSweeper {
    engine: Arc<ProcessEngine>,
    config: SweeperConfig,
}

impl ScheduleSweeper {
    /// Create a sweeper for `engine`
    pub fn new(engine: Arc<ProcessEngine>, config: SweeperConfig) -> Self {
        Self { engine, config }
    }

    /// Run until the shutdown receiver turns `true`.
    ///
    /// A sweep in progress is finished before the sweeper exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(poll_interval_ms = self.config.poll_interval.as_millis() as u64, "Schedule sweeper started");

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.engine.process_scheduled_steps().await {
                        Ok(resumed) if !resumed.is_empty() => {
                            debug!(resumed = resumed.len(), "Resumed scheduled steps");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Error sweeping scheduled steps"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Schedule sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}
