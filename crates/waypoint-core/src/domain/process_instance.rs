use crate::domain::process_definition::{ProcessDefinition, StepDefinition, StepType};
use crate::types::Variables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Created but not yet executed (sub-process children)
    NotStarted,

    /// Currently executing steps
    Running,

    /// Suspended on a task, timer, signal or child process
    Waiting,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,

    /// Stopped on request
    Cancelled,
}

impl ProcessStatus {
    /// Whether no further execution can happen
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed | ProcessStatus::Failed | ProcessStatus::Cancelled
        )
    }
}

/// Step instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Created, handler not yet invoked
    NotStarted,

    /// Handler is executing
    Running,

    /// Waiting for a human task to be completed
    WaitingForTask,

    /// Waiting for a point in time
    WaitingForSchedule,

    /// Waiting for a named signal
    WaitingForSignal,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,

    /// Abandoned because its process was cancelled
    Skipped,
}

impl StepStatus {
    /// Whether the step can no longer change
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Whether the step is suspended
    #[inline]
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            StepStatus::WaitingForTask | StepStatus::WaitingForSchedule | StepStatus::WaitingForSignal
        )
    }
}

/// Aggregate: one execution of a process definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    /// Unique identifier
    pub id: String,

    /// Definition this instance executes
    pub process_definition_id: String,

    /// Definition version this instance executes
    pub process_version: u32,

    /// Current status
    pub status: ProcessStatus,

    /// Start timestamp
    pub started_at: DateTime<Utc>,

    /// Completion timestamp, set once terminal
    pub completed_at: Option<DateTime<Utc>>,

    /// Step being executed or awaited; `None` once terminal
    pub current_step_id: Option<String>,

    /// Process variables
    #[serde(default)]
    pub variables: Variables,

    /// Error message if the instance failed
    pub error_message: Option<String>,

    /// Owning process instance for sub-processes
    pub parent_process_instance_id: Option<String>,
}

impl ProcessInstance {
    /// Create a running instance positioned on the definition's start step
    pub fn new(definition: &ProcessDefinition, variables: Variables) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            process_definition_id: definition.id.clone(),
            process_version: definition.version,
            status: ProcessStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            current_step_id: Some(definition.start_step_id.clone()),
            variables,
            error_message: None,
            parent_process_instance_id: None,
        }
    }

    /// Create a not-yet-started child instance of `parent_id`
    pub fn new_child(definition: &ProcessDefinition, variables: Variables, parent_id: &str) -> Self {
        let mut child = Self::new(definition, variables);
        child.status = ProcessStatus::NotStarted;
        child.parent_process_instance_id = Some(parent_id.to_string());
        child
    }

    /// Whether the instance has finished
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge step outputs into the variables; outputs win
    pub fn merge_variables(&mut self, output: &Variables) {
        for (key, value) in output {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Mark as completed
    pub fn complete(&mut self) {
        self.status = ProcessStatus::Completed;
        self.current_step_id = None;
        self.completed_at = Some(Utc::now());
    }

    /// Mark as failed with a message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ProcessStatus::Failed;
        self.current_step_id = None;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark as cancelled
    pub fn cancel(&mut self) {
        self.status = ProcessStatus::Cancelled;
        self.current_step_id = None;
        self.completed_at = Some(Utc::now());
    }
}

/// Record of one step's execution within a process instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInstance {
    /// Unique identifier
    pub id: String,

    /// Owning process instance
    pub process_instance_id: String,

    /// Step definition this instance executes
    pub step_definition_id: String,

    /// Kind of the step
    pub step_type: StepType,

    /// Current status
    pub status: StepStatus,

    /// Creation timestamp
    pub started_at: DateTime<Utc>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Snapshot of the process variables at creation
    #[serde(default)]
    pub input_data: Variables,

    /// Step output
    #[serde(default)]
    pub output_data: Variables,

    /// Error message if the step failed
    pub error_message: Option<String>,

    /// Resume (or signal timeout) timestamp
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Name of the awaited signal
    pub waiting_for_signal: Option<String>,
}

impl StepInstance {
    /// Create a step instance capturing the current variables as input
    pub fn new(process_instance_id: &str, step: &StepDefinition, input_data: Variables) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            process_instance_id: process_instance_id.to_string(),
            step_definition_id: step.id.clone(),
            step_type: step.step_type(),
            status: StepStatus::NotStarted,
            started_at: Utc::now(),
            completed_at: None,
            input_data,
            output_data: Variables::new(),
            error_message: None,
            scheduled_for: None,
            waiting_for_signal: None,
        }
    }

    /// Mark as completed with output
    pub fn complete(&mut self, output: Variables) {
        self.status = StepStatus::Completed;
        self.output_data.extend(output);
        self.completed_at = Some(Utc::now());
    }

    /// Mark as failed with a message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark as skipped
    pub fn skip(&mut self) {
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }
}

/// A unit of human work created by an interactive step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    /// Unique identifier, issued by the task service
    pub id: String,

    /// Owning process instance
    pub process_instance_id: String,

    /// Owning step instance
    pub step_instance_id: String,

    /// Type of the task
    pub task_type: String,

    /// Role the task is assigned to
    pub assigned_role: String,

    /// User who claimed the task
    pub assigned_user_id: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Data presented with the task
    #[serde(default)]
    pub task_data: Variables,

    /// Data submitted on completion
    pub completion_data: Option<Variables>,

    /// Whether the task has been completed
    pub is_completed: bool,
}

impl TaskInstance {
    /// Mark as completed with the submitted payload
    pub fn complete(&mut self, completion_data: Variables) {
        self.is_completed = true;
        self.completion_data = Some(completion_data);
        self.completed_at = Some(Utc::now());
    }
}
