use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::domain::process_definition::StepType;
use crate::CoreError;

/// Domain event trait for all events in the engine
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the process instance ID this event is associated with
    fn process_instance_id(&self) -> &str;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Lifecycle events emitted by the process engine
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// A process instance was created and started
    ProcessStarted {
        /// Instance ID
        process_instance_id: String,
        /// Definition ID
        definition_id: String,
        /// Definition version
        version: u32,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// A step handler was dispatched
    StepStarted {
        /// Instance ID
        process_instance_id: String,
        /// Step definition ID
        step_id: String,
        /// Step kind
        step_type: StepType,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// A step completed and the instance moved on
    StepCompleted {
        /// Instance ID
        process_instance_id: String,
        /// Step definition ID
        step_id: String,
        /// Next step, if any
        next_step_id: Option<String>,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// A step suspended the instance
    ProcessWaiting {
        /// Instance ID
        process_instance_id: String,
        /// Step definition ID
        step_id: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// The instance completed
    ProcessCompleted {
        /// Instance ID
        process_instance_id: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// The instance failed
    ProcessFailed {
        /// Instance ID
        process_instance_id: String,
        /// Step that failed, if the failure was step-level
        step_id: Option<String>,
        /// Error message
        error: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// The instance was cancelled
    ProcessCancelled {
        /// Instance ID
        process_instance_id: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// A signal released a waiting step
    SignalDelivered {
        /// Instance ID
        process_instance_id: String,
        /// Signal name
        signal_name: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },

    /// A human task was completed
    TaskCompleted {
        /// Instance ID
        process_instance_id: String,
        /// Task ID
        task_id: String,
        /// Event time
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent for ProcessEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProcessEvent::ProcessStarted { .. } => "process_instance.started",
            ProcessEvent::StepStarted { .. } => "step.started",
            ProcessEvent::StepCompleted { .. } => "step.completed",
            ProcessEvent::ProcessWaiting { .. } => "process_instance.waiting",
            ProcessEvent::ProcessCompleted { .. } => "process_instance.completed",
            ProcessEvent::ProcessFailed { .. } => "process_instance.failed",
            ProcessEvent::ProcessCancelled { .. } => "process_instance.cancelled",
            ProcessEvent::SignalDelivered { .. } => "signal.delivered",
            ProcessEvent::TaskCompleted { .. } => "task.completed",
        }
    }

    fn process_instance_id(&self) -> &str {
        match self {
            ProcessEvent::ProcessStarted { process_instance_id, .. }
            | ProcessEvent::StepStarted { process_instance_id, .. }
            | ProcessEvent::StepCompleted { process_instance_id, .. }
            | ProcessEvent::ProcessWaiting { process_instance_id, .. }
            | ProcessEvent::ProcessCompleted { process_instance_id, .. }
            | ProcessEvent::ProcessFailed { process_instance_id, .. }
            | ProcessEvent::ProcessCancelled { process_instance_id, .. }
            | ProcessEvent::SignalDelivered { process_instance_id, .. }
            | ProcessEvent::TaskCompleted { process_instance_id, .. } => process_instance_id,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProcessEvent::ProcessStarted { timestamp, .. }
            | ProcessEvent::StepStarted { timestamp, .. }
            | ProcessEvent::StepCompleted { timestamp, .. }
            | ProcessEvent::ProcessWaiting { timestamp, .. }
            | ProcessEvent::ProcessCompleted { timestamp, .. }
            | ProcessEvent::ProcessFailed { timestamp, .. }
            | ProcessEvent::ProcessCancelled { timestamp, .. }
            | ProcessEvent::SignalDelivered { timestamp, .. }
            | ProcessEvent::TaskCompleted { timestamp, .. } => *timestamp,
        }
    }
}

/// Receives engine events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Event handler that writes every event to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

#[async_trait]
impl DomainEventHandler for TracingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        tracing::info!(
            event_type = event.event_type(),
            process_instance_id = %event.process_instance_id(),
            timestamp = %event.timestamp(),
            "{:?}",
            event
        );
        Ok(())
    }
}
