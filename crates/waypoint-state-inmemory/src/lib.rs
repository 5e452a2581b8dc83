//! In-memory state store for the Waypoint engine
//!
//! This crate provides in-memory implementations of the repository traits
//! defined in waypoint-core. It is useful for development, testing and
//! single-process deployments where persistence is not required.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use waypoint_core::{ProcessDefinition, ProcessInstance, Repositories, StepInstance, TaskInstance};

pub mod repositories;
pub use repositories::{
    InMemoryProcessDefinitionRepository, InMemoryProcessInstanceRepository,
    InMemoryStepInstanceRepository, InMemoryTaskRepository, Table,
};

/// Definitions keyed by id, then version
pub type DefinitionStore = Arc<RwLock<HashMap<String, BTreeMap<u32, ProcessDefinition>>>>;

/// Provider for in-memory repositories
///
/// Every call to [`repositories`](Self::repositories) hands out views of the
/// same shared storage.
#[derive(Clone, Default)]
pub struct InMemoryStateStoreProvider {
    definitions: DefinitionStore,
    instances: Arc<RwLock<Table<ProcessInstance>>>,
    steps: Arc<RwLock<Table<StepInstance>>>,
    tasks: Arc<RwLock<Table<TaskInstance>>>,
}

impl InMemoryStateStoreProvider {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Repositories backed by this store
    pub fn repositories(&self) -> Repositories {
        Repositories {
            definitions: Arc::new(InMemoryProcessDefinitionRepository::new(
                self.definitions.clone(),
            )),
            instances: Arc::new(InMemoryProcessInstanceRepository::new(self.instances.clone())),
            steps: Arc::new(InMemoryStepInstanceRepository::new(self.steps.clone())),
            tasks: Arc::new(InMemoryTaskRepository::new(self.tasks.clone())),
        }
    }
}
