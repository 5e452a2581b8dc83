//! Step handlers
//!
//! One handler per [`StepType`]. A handler is invoked both to begin a step
//! and to re-check a step that is already waiting; it branches on the step
//! instance status the engine observed before dispatching. Handlers never
//! mutate the process instance. They describe the outcome in a
//! [`StepExecutionResult`] and the engine applies it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::condition::ConditionEvaluator;
use crate::domain::process_definition::{StepDefinition, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance, StepStatus};
use crate::domain::repository::Repositories;
use crate::domain::services::{CommandExecutor, QueryExecutor, TaskService};
use crate::types::Variables;
use crate::CoreError;

pub mod business;
pub mod decision;
pub mod interactive;
pub mod scheduled;
pub mod signal;
pub mod subprocess;

pub use business::BusinessStepHandler;
pub use decision::DecisionStepHandler;
pub use interactive::InteractiveStepHandler;
pub use scheduled::ScheduledStepHandler;
pub use signal::SignalStepHandler;
pub use subprocess::{SubProcessStepHandler, SUB_PROCESS_INSTANCE_KEY};

/// Outcome of one handler invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepExecutionResult {
    /// The step finished successfully
    pub is_completed: bool,

    /// The step is suspended and must be resumed later
    pub requires_wait: bool,

    /// Step to continue with after completion
    pub next_step_id: Option<String>,

    /// Output variables; on wait they are recorded on the step instance only
    pub output_data: Variables,

    /// Failure reason
    pub error_message: Option<String>,

    /// Time at which a waiting step should be re-checked; the timeout when
    /// `waiting_for_signal` is set
    pub resume_at: Option<DateTime<Utc>>,

    /// Signal a waiting step is waiting for
    pub waiting_for_signal: Option<String>,
}

impl StepExecutionResult {
    /// Successful completion continuing with `next_step_id`
    pub fn completed(next_step_id: Option<String>, output_data: Variables) -> Self {
        Self {
            is_completed: true,
            next_step_id,
            output_data,
            ..Default::default()
        }
    }

    /// Suspend until an external trigger re-invokes the process
    pub fn wait() -> Self {
        Self {
            requires_wait: true,
            ..Default::default()
        }
    }

    /// Suspend until `resume_at`
    pub fn wait_until(resume_at: DateTime<Utc>) -> Self {
        Self {
            requires_wait: true,
            resume_at: Some(resume_at),
            ..Default::default()
        }
    }

    /// Suspend until `signal_name` is delivered, optionally timing out at `timeout_at`
    pub fn wait_for_signal(signal_name: impl Into<String>, timeout_at: Option<DateTime<Utc>>) -> Self {
        Self {
            requires_wait: true,
            waiting_for_signal: Some(signal_name.into()),
            resume_at: timeout_at,
            ..Default::default()
        }
    }

    /// Failure with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach output data
    pub fn with_output(mut self, output_data: Variables) -> Self {
        self.output_data = output_data;
        self
    }

    /// Status a step instance takes while this result keeps it waiting.
    /// A signal name wins over a resume time, which then acts as the timeout.
    pub fn wait_status(&self) -> StepStatus {
        if self.waiting_for_signal.is_some() {
            StepStatus::WaitingForSignal
        } else if self.resume_at.is_some() {
            StepStatus::WaitingForSchedule
        } else {
            StepStatus::WaitingForTask
        }
    }
}

/// Executes one kind of step
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step type this handler executes
    fn step_type(&self) -> StepType;

    /// Begin or re-check a step.
    ///
    /// `step_instance.status` is the status before the engine marked the
    /// step running. Business failures are reported through the result;
    /// `Err` is reserved for repository failures.
    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError>;
}

/// Lookup table from step type to handler
#[derive(Clone, Default)]
pub struct StepHandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl StepHandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from handlers, rejecting duplicate step types
    pub fn from_handlers(
        handlers: impl IntoIterator<Item = Arc<dyn StepHandler>>,
    ) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Registry with the built-in handler for every step type
    pub fn standard(
        repositories: &Repositories,
        command_executor: Arc<dyn CommandExecutor>,
        query_executor: Arc<dyn QueryExecutor>,
        task_service: Arc<dyn TaskService>,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Result<Self, CoreError> {
        Self::from_handlers([
            Arc::new(BusinessStepHandler::new(command_executor)) as Arc<dyn StepHandler>,
            Arc::new(DecisionStepHandler::new(query_executor, condition_evaluator)),
            Arc::new(InteractiveStepHandler::new(
                task_service,
                repositories.tasks.clone(),
            )),
            Arc::new(ScheduledStepHandler::new()),
            Arc::new(SignalStepHandler::new()),
            Arc::new(SubProcessStepHandler::new(
                repositories.definitions.clone(),
                repositories.instances.clone(),
            )),
        ])
    }

    /// Register a handler; fails if its step type already has one
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) -> Result<(), CoreError> {
        let step_type = handler.step_type();
        if self.handlers.contains_key(&step_type) {
            return Err(CoreError::DuplicateHandler(step_type.to_string()));
        }
        self.handlers.insert(step_type, handler);
        Ok(())
    }

    /// Handler for a step type
    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(&step_type).cloned()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Instance variables with `overrides` laid on top
pub(crate) fn merge_over(variables: &Variables, overrides: &Variables) -> Variables {
    let mut merged = variables.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Failure result for a handler dispatched with the wrong step kind
pub(crate) fn kind_mismatch(step: &StepDefinition, expected: StepType) -> StepExecutionResult {
    StepExecutionResult::failed(format!(
        "Step {} is a {} step, expected {}",
        step.id,
        step.step_type(),
        expected
    ))
}
