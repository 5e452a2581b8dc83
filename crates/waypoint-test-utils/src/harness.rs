//! An engine wired over the in-memory store with recording fakes.

use std::sync::Arc;
use waypoint_core::{
    CoreError, ProcessDefinition, ProcessEngine, ProcessInstance, Repositories,
    SimpleConditionEvaluator, StepHandlerRegistry, StepInstance, TaskInstance,
};
use waypoint_state_inmemory::InMemoryStateStoreProvider;

use crate::implementations::{
    RecordingCommandExecutor, RecordingEventHandler, ScriptedQueryExecutor, SequentialTaskService,
};

/// Engine plus the fakes it talks to.
///
/// Fields are public so tests can configure replies and inspect calls.
pub struct TestHarness {
    /// Storage shared by the engine
    pub provider: InMemoryStateStoreProvider,
    /// Repositories over `provider`
    pub repositories: Repositories,
    /// Engine under test
    pub engine: Arc<ProcessEngine>,
    /// Command executor fake
    pub commands: Arc<RecordingCommandExecutor>,
    /// Query executor fake
    pub queries: Arc<ScriptedQueryExecutor>,
    /// Task service fake
    pub tasks: Arc<SequentialTaskService>,
    /// Event recorder
    pub events: Arc<RecordingEventHandler>,
}

impl TestHarness {
    /// Build a harness with the standard handler set
    pub fn new() -> Result<Self, CoreError> {
        let provider = InMemoryStateStoreProvider::new();
        let repositories = provider.repositories();
        let commands = Arc::new(RecordingCommandExecutor::new());
        let queries = Arc::new(ScriptedQueryExecutor::new());
        let tasks = Arc::new(SequentialTaskService::new());
        let events = Arc::new(RecordingEventHandler::new());

        let handlers = StepHandlerRegistry::standard(
            &repositories,
            commands.clone(),
            queries.clone(),
            tasks.clone(),
            Arc::new(SimpleConditionEvaluator),
        )?;
        let engine = Arc::new(ProcessEngine::new(
            repositories.clone(),
            handlers,
            events.clone(),
        ));

        Ok(Self {
            provider,
            repositories,
            engine,
            commands,
            queries,
            tasks,
            events,
        })
    }

    /// Save definitions, returning them as stored
    pub async fn deploy(
        &self,
        definitions: impl IntoIterator<Item = ProcessDefinition>,
    ) -> Result<Vec<ProcessDefinition>, CoreError> {
        let mut saved = Vec::new();
        for definition in definitions {
            saved.push(self.repositories.definitions.save(&definition).await?);
        }
        Ok(saved)
    }

    /// Current state of an instance
    pub async fn instance(&self, id: &str) -> Result<ProcessInstance, CoreError> {
        self.repositories
            .instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::ProcessInstanceNotFound(id.to_string()))
    }

    /// Step instances of an instance, in creation order
    pub async fn steps(&self, process_instance_id: &str) -> Result<Vec<StepInstance>, CoreError> {
        self.repositories
            .steps
            .find_by_process_instance_id(process_instance_id)
            .await
    }

    /// Tasks of an instance
    pub async fn task_instances(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskInstance>, CoreError> {
        self.repositories
            .tasks
            .find_by_process_instance_id(process_instance_id)
            .await
    }
}
