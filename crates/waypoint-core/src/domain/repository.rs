//! Repository traits for the Waypoint engine
//!
//! The engine persists every state change through these traits. External
//! crates implement them to provide a storage backend; each method is an
//! independently durable write or read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::process_definition::ProcessDefinition;
use super::process_instance::{ProcessInstance, ProcessStatus, StepInstance, TaskInstance};
use crate::CoreError;

/// Repository for process definitions
#[async_trait]
pub trait ProcessDefinitionRepository: Send + Sync {
    /// Find a definition by ID; the latest version when `version` is `None`
    async fn find_by_id(
        &self,
        id: &str,
        version: Option<u32>,
    ) -> Result<Option<ProcessDefinition>, CoreError>;

    /// Save a definition. Stores assign the next version for the id when
    /// the definition's version is 0.
    async fn save(&self, definition: &ProcessDefinition) -> Result<ProcessDefinition, CoreError>;

    /// Latest version of every definition
    async fn find_all(&self) -> Result<Vec<ProcessDefinition>, CoreError>;

    /// All versions of one definition, ascending
    async fn find_versions(&self, id: &str) -> Result<Vec<ProcessDefinition>, CoreError>;
}

/// Repository for process instances
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// Find an instance by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<ProcessInstance>, CoreError>;

    /// Persist a new instance
    async fn create(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Persist changes to an existing instance
    async fn update(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Instances in the given status
    async fn find_by_status(&self, status: ProcessStatus) -> Result<Vec<ProcessInstance>, CoreError>;

    /// Instances of the given definition, any version
    async fn find_by_definition_id(
        &self,
        definition_id: &str,
    ) -> Result<Vec<ProcessInstance>, CoreError>;
}

/// Repository for step instances
#[async_trait]
pub trait StepInstanceRepository: Send + Sync {
    /// Find a step instance by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<StepInstance>, CoreError>;

    /// Persist a new step instance
    async fn create(&self, step: &StepInstance) -> Result<(), CoreError>;

    /// Persist changes to an existing step instance
    async fn update(&self, step: &StepInstance) -> Result<(), CoreError>;

    /// Step instances of one process instance, in creation order
    async fn find_by_process_instance_id(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<StepInstance>, CoreError>;

    /// Waiting step instances whose `scheduled_for` is at or before `now`.
    /// Covers `WaitingForSchedule` steps and `WaitingForSignal` steps with a
    /// timeout.
    async fn find_scheduled_due(&self, now: DateTime<Utc>) -> Result<Vec<StepInstance>, CoreError>;

    /// `WaitingForSignal` step instances awaiting `signal_name`
    async fn find_waiting_for_signal(
        &self,
        signal_name: &str,
    ) -> Result<Vec<StepInstance>, CoreError>;
}

/// Repository for human tasks
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Find a task by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<TaskInstance>, CoreError>;

    /// Persist a new task
    async fn create(&self, task: &TaskInstance) -> Result<(), CoreError>;

    /// Persist changes to an existing task
    async fn update(&self, task: &TaskInstance) -> Result<(), CoreError>;

    /// Tasks of one process instance
    async fn find_by_process_instance_id(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskInstance>, CoreError>;

    /// Uncompleted tasks assigned to `role`
    async fn find_pending_by_role(&self, role: &str) -> Result<Vec<TaskInstance>, CoreError>;

    /// Tasks assigned to `user_id`
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<TaskInstance>, CoreError>;
}

/// The four repositories the engine persists through
#[derive(Clone)]
pub struct Repositories {
    /// Process definitions
    pub definitions: Arc<dyn ProcessDefinitionRepository>,

    /// Process instances
    pub instances: Arc<dyn ProcessInstanceRepository>,

    /// Step instances
    pub steps: Arc<dyn StepInstanceRepository>,

    /// Human tasks
    pub tasks: Arc<dyn TaskRepository>,
}
