//! Bootstrap file: canned collaborator replies and processes to start.
//!
//! Kept out of the layered config because the `config` crate folds key case,
//! and command names and variable names here are case sensitive.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use waypoint_core::domain::serialization::DefinitionFormat;
use waypoint_core::{ProcessEngine, Variables};

/// Request to start one process instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Definition to instantiate
    pub definition_id: String,

    /// Pinned version; latest when absent
    #[serde(default)]
    pub version: Option<u32>,

    /// Initial variables
    #[serde(default)]
    pub variables: Variables,
}

/// Contents of the bootstrap file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bootstrap {
    /// Output returned for each command name
    pub commands: HashMap<String, Variables>,

    /// Output returned for each query name
    pub queries: HashMap<String, Variables>,

    /// Processes started once definitions are loaded
    pub start: Vec<StartRequest>,
}

impl Bootstrap {
    /// Read a `.json`, `.yaml` or `.yml` bootstrap file
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read bootstrap file {}", path.display()))?;
        let bootstrap = match DefinitionFormat::from_path(path) {
            Some(DefinitionFormat::Json) => serde_json::from_str(&content)?,
            Some(DefinitionFormat::Yaml) => serde_yaml::from_str(&content)?,
            None => anyhow::bail!("Unsupported bootstrap file: {}", path.display()),
        };
        Ok(bootstrap)
    }

    /// Start every configured process, returning the instance IDs
    pub async fn start_processes(&self, engine: &ProcessEngine) -> anyhow::Result<Vec<String>> {
        let mut started = Vec::with_capacity(self.start.len());
        for request in &self.start {
            let instance = engine
                .start_process(
                    &request.definition_id,
                    Some(request.variables.clone()),
                    request.version,
                )
                .await
                .with_context(|| format!("Cannot start {}", request.definition_id))?;
            info!(
                process_instance_id = %instance.id,
                definition_id = %request.definition_id,
                status = ?instance.status,
                "Configured process started"
            );
            started.push(instance.id);
        }
        Ok(started)
    }
}
