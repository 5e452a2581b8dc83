//! Fake collaborators for engine tests.
//!
//! Unlike the mocks, these keep a record of every call so a test can drive a
//! whole process and inspect what happened afterwards.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use waypoint_core::{
    CommandExecutor, CoreError, DomainEvent, DomainEventHandler, QueryExecutor, TaskService,
    Variables,
};

/// Canned outcome of a command or query
#[derive(Debug, Clone)]
enum Outcome {
    Output(Variables),
    Failure(String),
}

impl Outcome {
    fn resolve(&self) -> anyhow::Result<Variables> {
        match self {
            Outcome::Output(vars) => Ok(vars.clone()),
            Outcome::Failure(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}

/// Command executor that records calls and replies from a table.
///
/// Commands without a configured reply succeed with no output.
#[derive(Debug, Default)]
pub struct RecordingCommandExecutor {
    replies: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<(String, Variables)>>,
}

impl RecordingCommandExecutor {
    /// Create an executor with no configured replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `command_name` with `output`
    pub fn reply(&self, command_name: &str, output: Variables) -> &Self {
        self.replies
            .lock()
            .insert(command_name.to_string(), Outcome::Output(output));
        self
    }

    /// Fail `command_name` with `message`
    pub fn fail(&self, command_name: &str, message: &str) -> &Self {
        self.replies
            .lock()
            .insert(command_name.to_string(), Outcome::Failure(message.to_string()));
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<(String, Variables)> {
        self.calls.lock().clone()
    }

    /// Names of the commands called so far, in order
    pub fn command_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// How often `command_name` was called
    pub fn call_count(&self, command_name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == command_name)
            .count()
    }
}

#[async_trait]
impl CommandExecutor for RecordingCommandExecutor {
    async fn execute(&self, command_name: &str, parameters: &Variables) -> anyhow::Result<Variables> {
        self.calls
            .lock()
            .push((command_name.to_string(), parameters.clone()));
        let reply = self.replies.lock().get(command_name).cloned();
        match reply {
            Some(outcome) => outcome.resolve(),
            None => Ok(Variables::new()),
        }
    }
}

/// Query executor answering from a table.
///
/// Unknown queries fail, so a misspelt query name shows up as a failed step.
#[derive(Debug, Default)]
pub struct ScriptedQueryExecutor {
    answers: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<(String, Variables)>>,
}

impl ScriptedQueryExecutor {
    /// Create an executor with no configured answers
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query_name` with `result`
    pub fn answer(&self, query_name: &str, result: Variables) -> &Self {
        self.answers
            .lock()
            .insert(query_name.to_string(), Outcome::Output(result));
        self
    }

    /// Fail `query_name` with `message`
    pub fn fail(&self, query_name: &str, message: &str) -> &Self {
        self.answers
            .lock()
            .insert(query_name.to_string(), Outcome::Failure(message.to_string()));
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<(String, Variables)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedQueryExecutor {
    async fn execute(&self, query_name: &str, parameters: &Variables) -> anyhow::Result<Variables> {
        self.calls
            .lock()
            .push((query_name.to_string(), parameters.clone()));
        let answer = self.answers.lock().get(query_name).cloned();
        match answer {
            Some(outcome) => outcome.resolve(),
            None => Err(anyhow::anyhow!("Unknown query: {}", query_name)),
        }
    }
}

/// A task issued through [`SequentialTaskService`]
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedTask {
    /// Issued ID
    pub id: String,
    /// Owning process instance
    pub process_instance_id: String,
    /// Owning step instance
    pub step_instance_id: String,
    /// Task type
    pub task_type: String,
    /// Assigned role
    pub role: String,
    /// Data handed to the task
    pub data: Variables,
}

/// Task service issuing `task-1`, `task-2`, ... and remembering each task
#[derive(Debug, Default)]
pub struct SequentialTaskService {
    next: AtomicUsize,
    issued: Mutex<Vec<IssuedTask>>,
}

impl SequentialTaskService {
    /// Create a service starting at `task-1`
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks issued so far, in order
    pub fn issued(&self) -> Vec<IssuedTask> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl TaskService for SequentialTaskService {
    async fn create_task(
        &self,
        process_instance_id: &str,
        step_instance_id: &str,
        task_type: &str,
        role: &str,
        data: &Variables,
    ) -> anyhow::Result<String> {
        let id = format!("task-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.issued.lock().push(IssuedTask {
            id: id.clone(),
            process_instance_id: process_instance_id.to_string(),
            step_instance_id: step_instance_id.to_string(),
            task_type: task_type.to_string(),
            role: role.to_string(),
            data: data.clone(),
        });
        Ok(id)
    }
}

/// Event handler keeping `(event_type, process_instance_id)` pairs
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingEventHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Event types recorded for one instance, in order
    pub fn event_types_for(&self, process_instance_id: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, id)| id == process_instance_id)
            .map(|(event_type, _)| event_type.clone())
            .collect()
    }

    /// Number of recorded events of `event_type` across all instances
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait]
impl DomainEventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        tracing::debug!(event_type = event.event_type(), "Recorded event");
        self.events.lock().push((
            event.event_type().to_string(),
            event.process_instance_id().to_string(),
        ));
        Ok(())
    }
}
