//! Configuration for the Waypoint runner
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! environment variables prefixed with `WAYPOINT_`.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use waypoint_core::SweeperConfig;
use waypoint_monitoring::LoggingConfig;

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Directory scanned for `.json`, `.yaml` and `.yml` definitions
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    /// Interval between sweeps for due scheduled steps
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Canned collaborator replies and processes to start
    #[serde(default)]
    pub bootstrap_file: Option<PathBuf>,

    /// Accept control requests on stdin
    #[serde(default = "default_control_stdin")]
    pub control_stdin: bool,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_control_stdin() -> bool {
    true
}

fn default_log_filter() -> String {
    "info,waypoint_core=debug".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            sweep_interval_ms: default_sweep_interval_ms(),
            log_filter: default_log_filter(),
            json_logs: false,
            bootstrap_file: None,
            control_stdin: default_control_stdin(),
        }
    }
}

impl RunnerConfig {
    /// Load from `waypoint.{yaml,toml,json}` in the working directory, if
    /// present, and the environment
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Load from `file` (or the default `waypoint` file) and the environment
    pub fn load_from(file: Option<&Path>) -> anyhow::Result<Self> {
        let file_source = match file {
            Some(path) => ::config::File::from(path.to_path_buf()).required(true),
            None => ::config::File::with_name("waypoint").required(false),
        };

        let config: RunnerConfig = ::config::Config::builder()
            .add_source(file_source)
            .add_source(::config::Environment::with_prefix("WAYPOINT").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runner cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval_ms == 0 {
            bail!("sweep_interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Sweeper settings
    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            poll_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }

    /// Logging settings
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            service_name: "waypoint-runner".to_string(),
            log_filter: self.log_filter.clone(),
            enable_json_logging: self.json_logs,
        }
    }
}
