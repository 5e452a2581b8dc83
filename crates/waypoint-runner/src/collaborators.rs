//! Collaborators used when the runner hosts the engine on its own.
//!
//! Commands and queries answer with the canned output from the bootstrap
//! file. Names without a canned output fail the step that invoked them.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use waypoint_core::{CommandExecutor, QueryExecutor, TaskService, Variables};

/// Answers commands from a fixed table
#[derive(Debug, Default, Clone)]
pub struct CannedCommands {
    replies: HashMap<String, Variables>,
}

impl CannedCommands {
    /// Executor answering from `replies`
    pub fn new(replies: HashMap<String, Variables>) -> Self {
        Self { replies }
    }
}

#[async_trait]
impl CommandExecutor for CannedCommands {
    async fn execute(&self, command_name: &str, parameters: &Variables) -> anyhow::Result<Variables> {
        match self.replies.get(command_name) {
            Some(output) => {
                debug!(command = command_name, parameters = parameters.len(), "Command answered");
                Ok(output.clone())
            }
            None => anyhow::bail!("No command executor configured for command: {}", command_name),
        }
    }
}

/// Answers queries from a fixed table
#[derive(Debug, Default, Clone)]
pub struct CannedQueries {
    replies: HashMap<String, Variables>,
}

impl CannedQueries {
    /// Executor answering from `replies`
    pub fn new(replies: HashMap<String, Variables>) -> Self {
        Self { replies }
    }
}

#[async_trait]
impl QueryExecutor for CannedQueries {
    async fn execute(&self, query_name: &str, _parameters: &Variables) -> anyhow::Result<Variables> {
        self.replies
            .get(query_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No query executor configured for query: {}", query_name))
    }
}

/// Issues random task IDs; the engine records the tasks itself
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneratedIdTaskService;

#[async_trait]
impl TaskService for GeneratedIdTaskService {
    async fn create_task(
        &self,
        process_instance_id: &str,
        _step_instance_id: &str,
        task_type: &str,
        role: &str,
        _data: &Variables,
    ) -> anyhow::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(process_instance_id, task_id = %id, task_type, role, "Task issued");
        Ok(id)
    }
}
