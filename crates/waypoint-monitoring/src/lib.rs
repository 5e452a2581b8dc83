//! Logging setup for Waypoint services.

use serde::{Deserialize, Serialize};

pub mod logging;
pub use logging::{init_logging, LogExt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Filter directives used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Emit JSON lines instead of human-readable output
    pub enable_json_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "waypoint".to_string(),
            log_filter: "info,waypoint_core=debug".to_string(),
            enable_json_logging: false,
        }
    }
}
