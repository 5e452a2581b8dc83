use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use waypoint_core::{
    CoreError, ProcessDefinition, ProcessDefinitionRepository, ProcessInstance,
    ProcessInstanceRepository, ProcessStatus, StepInstance, StepInstanceRepository, StepStatus,
    TaskInstance, TaskRepository,
};

use crate::DefinitionStore;

/// Rows keyed by id that remember insertion order
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn get(&self, id: &str) -> Option<T> {
        self.rows.get(id).cloned()
    }

    fn insert(&mut self, kind: &str, id: &str, row: &T) -> Result<(), CoreError> {
        if self.rows.contains_key(id) {
            return Err(CoreError::StateStoreError(format!(
                "{} already exists: {}",
                kind, id
            )));
        }
        self.rows.insert(id.to_string(), row.clone());
        self.order.push(id.to_string());
        Ok(())
    }

    fn replace(&mut self, kind: &str, id: &str, row: &T) -> Result<(), CoreError> {
        match self.rows.get_mut(id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(CoreError::StateStoreError(format!(
                "{} does not exist: {}",
                kind, id
            ))),
        }
    }

    /// Rows matching `predicate`, in insertion order
    fn select(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory implementation of the ProcessDefinitionRepository
pub struct InMemoryProcessDefinitionRepository {
    definitions: DefinitionStore,
}

impl InMemoryProcessDefinitionRepository {
    /// Create a new in-memory process definition repository
    pub fn new(definitions: DefinitionStore) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl ProcessDefinitionRepository for InMemoryProcessDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &str,
        version: Option<u32>,
    ) -> Result<Option<ProcessDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        let Some(versions) = definitions.get(id) else {
            return Ok(None);
        };
        Ok(match version {
            Some(v) => versions.get(&v).cloned(),
            None => versions.values().next_back().cloned(),
        })
    }

    async fn save(&self, definition: &ProcessDefinition) -> Result<ProcessDefinition, CoreError> {
        let mut definitions = self.definitions.write().await;
        let versions = definitions.entry(definition.id.clone()).or_default();

        let mut saved = definition.clone();
        if saved.version == 0 {
            saved.version = versions.keys().next_back().map_or(1, |latest| latest + 1);
        } else if versions.contains_key(&saved.version) {
            return Err(CoreError::StateStoreError(format!(
                "Process definition already exists: {} (version {})",
                saved.id, saved.version
            )));
        }
        versions.insert(saved.version, saved.clone());

        debug!(definition_id = %saved.id, version = saved.version, "Saved process definition");
        Ok(saved)
    }

    async fn find_all(&self) -> Result<Vec<ProcessDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        let mut latest: Vec<ProcessDefinition> = definitions
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect();
        latest.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(latest)
    }

    async fn find_versions(&self, id: &str) -> Result<Vec<ProcessDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .get(id)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory implementation of the ProcessInstanceRepository
pub struct InMemoryProcessInstanceRepository {
    instances: Arc<RwLock<Table<ProcessInstance>>>,
}

impl InMemoryProcessInstanceRepository {
    /// Create a new in-memory process instance repository
    pub fn new(instances: Arc<RwLock<Table<ProcessInstance>>>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryProcessInstanceRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ProcessInstance>, CoreError> {
        Ok(self.instances.read().await.get(id))
    }

    async fn create(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
        self.instances
            .write()
            .await
            .insert("Process instance", &instance.id, instance)
    }

    async fn update(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
        self.instances
            .write()
            .await
            .replace("Process instance", &instance.id, instance)
    }

    async fn find_by_status(&self, status: ProcessStatus) -> Result<Vec<ProcessInstance>, CoreError> {
        Ok(self.instances.read().await.select(|i| i.status == status))
    }

    async fn find_by_definition_id(
        &self,
        definition_id: &str,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        Ok(self
            .instances
            .read()
            .await
            .select(|i| i.process_definition_id == definition_id))
    }
}

/// In-memory implementation of the StepInstanceRepository
pub struct InMemoryStepInstanceRepository {
    steps: Arc<RwLock<Table<StepInstance>>>,
}

impl InMemoryStepInstanceRepository {
    /// Create a new in-memory step instance repository
    pub fn new(steps: Arc<RwLock<Table<StepInstance>>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl StepInstanceRepository for InMemoryStepInstanceRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<StepInstance>, CoreError> {
        Ok(self.steps.read().await.get(id))
    }

    async fn create(&self, step: &StepInstance) -> Result<(), CoreError> {
        self.steps.write().await.insert("Step instance", &step.id, step)
    }

    async fn update(&self, step: &StepInstance) -> Result<(), CoreError> {
        self.steps.write().await.replace("Step instance", &step.id, step)
    }

    async fn find_by_process_instance_id(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<StepInstance>, CoreError> {
        Ok(self
            .steps
            .read()
            .await
            .select(|s| s.process_instance_id == process_instance_id))
    }

    async fn find_scheduled_due(&self, now: DateTime<Utc>) -> Result<Vec<StepInstance>, CoreError> {
        Ok(self.steps.read().await.select(|s| {
            matches!(
                s.status,
                StepStatus::WaitingForSchedule | StepStatus::WaitingForSignal
            ) && s.scheduled_for.map_or(false, |at| at <= now)
        }))
    }

    async fn find_waiting_for_signal(
        &self,
        signal_name: &str,
    ) -> Result<Vec<StepInstance>, CoreError> {
        Ok(self.steps.read().await.select(|s| {
            s.status == StepStatus::WaitingForSignal
                && s.waiting_for_signal.as_deref() == Some(signal_name)
        }))
    }
}

/// In-memory implementation of the TaskRepository
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<Table<TaskInstance>>>,
}

impl InMemoryTaskRepository {
    /// Create a new in-memory task repository
    pub fn new(tasks: Arc<RwLock<Table<TaskInstance>>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<TaskInstance>, CoreError> {
        Ok(self.tasks.read().await.get(id))
    }

    async fn create(&self, task: &TaskInstance) -> Result<(), CoreError> {
        self.tasks.write().await.insert("Task", &task.id, task)
    }

    async fn update(&self, task: &TaskInstance) -> Result<(), CoreError> {
        self.tasks.write().await.replace("Task", &task.id, task)
    }

    async fn find_by_process_instance_id(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskInstance>, CoreError> {
        Ok(self
            .tasks
            .read()
            .await
            .select(|t| t.process_instance_id == process_instance_id))
    }

    async fn find_pending_by_role(&self, role: &str) -> Result<Vec<TaskInstance>, CoreError> {
        Ok(self
            .tasks
            .read()
            .await
            .select(|t| !t.is_completed && t.assigned_role == role))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<TaskInstance>, CoreError> {
        Ok(self
            .tasks
            .read()
            .await
            .select(|t| t.assigned_user_id.as_deref() == Some(user_id)))
    }
}
