//!
//! Waypoint Core - resumable process engine
//!
//! This crate defines process definitions, process and step instances, the
//! step handlers for each step type and the engine that drives instances
//! through their steps. Persistence and the business side (commands,
//! queries, human tasks) are supplied by the caller through traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - definitions, instances, repositories and events
pub mod domain;

/// Application services - the process engine and the schedule sweeper
pub mod application;

/// Step handlers
pub mod handlers;

/// Route condition evaluation
pub mod condition;

/// Core value types
pub mod types;

/// Error types
pub mod error;

pub use application::{ProcessEngine, ScheduleSweeper, SweeperConfig};
pub use condition::{ConditionEvaluator, SimpleConditionEvaluator};
pub use domain::events::{DomainEvent, DomainEventHandler, ProcessEvent, TracingEventHandler};
pub use domain::process_definition::{
    BusinessStep, DecisionRoute, DecisionStep, InteractiveStep, ProcessDefinition, ScheduledStep,
    SignalStep, StepDefinition, StepKind, StepType, SubProcessStep,
};
pub use domain::process_instance::{
    ProcessInstance, ProcessStatus, StepInstance, StepStatus, TaskInstance,
};
pub use domain::repository::{
    ProcessDefinitionRepository, ProcessInstanceRepository, Repositories, StepInstanceRepository,
    TaskRepository,
};
pub use domain::services::{CommandExecutor, QueryExecutor, TaskService};
pub use error::CoreError;
pub use handlers::{StepExecutionResult, StepHandler, StepHandlerRegistry};
pub use types::{Value, Variables};
