//! Outbound collaborators invoked by step handlers
//!
//! Host applications implement these to connect the engine to their own
//! commands, queries and task inbox. Errors are opaque to the engine and
//! surface as the failing step's error message.

use async_trait::async_trait;

use crate::types::Variables;

/// Executes write operations for business steps
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command_name` and return its result variables
    async fn execute(&self, command_name: &str, parameters: &Variables) -> anyhow::Result<Variables>;
}

/// Executes read operations for decision steps
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `query_name` and return its result variables
    async fn execute(&self, query_name: &str, parameters: &Variables) -> anyhow::Result<Variables>;
}

/// Creates human tasks for interactive steps
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Create a task and return its ID
    async fn create_task(
        &self,
        process_instance_id: &str,
        step_instance_id: &str,
        task_type: &str,
        role: &str,
        data: &Variables,
    ) -> anyhow::Result<String>;
}
