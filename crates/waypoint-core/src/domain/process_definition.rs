use crate::types::Variables;
use crate::CoreError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Kind of a step, shared by definitions and step instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Invokes a named command
    Business,
    /// Creates a human task and waits for its completion
    Interactive,
    /// Runs a query and routes on its result
    Decision,
    /// Waits until a point in time
    Scheduled,
    /// Waits for a named external signal
    Signal,
    /// Runs a child process instance
    SubProcess,
}

impl StepType {
    /// All step types, in declaration order
    pub const ALL: [StepType; 6] = [
        StepType::Business,
        StepType::Interactive,
        StepType::Decision,
        StepType::Scheduled,
        StepType::Signal,
        StepType::SubProcess,
    ];

    /// Discriminator name used in serialized definitions
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Business => "Business",
            StepType::Interactive => "Interactive",
            StepType::Decision => "Decision",
            StepType::Scheduled => "Scheduled",
            StepType::Signal => "Signal",
            StepType::SubProcess => "SubProcess",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Versioned template describing the steps of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    /// ID of the process
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Description of the process
    #[serde(default)]
    pub description: String,

    /// Version number; identity is `(id, version)`
    #[serde(default)]
    pub version: u32,

    /// ID of the first step to execute
    pub start_step_id: String,

    /// Steps making up the process
    pub steps: Vec<StepDefinition>,
}

/// A single step of a process definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// ID of the step, unique within its definition
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Step to continue with once this one completes (non-branching kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,

    /// Kind-specific configuration, discriminated by `type`
    #[serde(flatten)]
    pub kind: StepKind,
}

/// Kind-specific step configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepKind {
    /// See [`BusinessStep`]
    Business(BusinessStep),
    /// See [`InteractiveStep`]
    Interactive(InteractiveStep),
    /// See [`DecisionStep`]
    Decision(DecisionStep),
    /// See [`ScheduledStep`]
    Scheduled(ScheduledStep),
    /// See [`SignalStep`]
    Signal(SignalStep),
    /// See [`SubProcessStep`]
    SubProcess(SubProcessStep),
}

/// Invokes a command through the command executor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessStep {
    /// Name of the command to execute
    pub command_name: String,

    /// Static parameters laid over the instance variables
    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub parameters: Variables,
}

/// Creates a task for a human and waits until it is completed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveStep {
    /// Type of task to create
    pub task_type: String,

    /// Role the task is assigned to
    #[serde(default)]
    pub default_role: String,

    /// Static task data laid over the instance variables
    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub task_data: Variables,
}

/// Runs a query and picks the next step from its routes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionStep {
    /// Name of the query to execute
    pub query_name: String,

    /// Static parameters laid over the instance variables
    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub parameters: Variables,

    /// Candidate routes; evaluated by ascending priority
    #[serde(default)]
    pub routes: Vec<DecisionRoute>,
}

/// A conditional transition out of a decision step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRoute {
    /// Step to continue with when the condition holds
    pub target_step_id: String,

    /// Condition in the comparison language of [`crate::condition`]
    #[serde(default)]
    pub condition: String,

    /// Lower priorities are evaluated first
    #[serde(default)]
    pub priority: i32,
}

/// Waits until a computed point in time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
    /// Explicit resume time; takes precedence over the delay fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_expression: Option<String>,

    /// Delay in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<i64>,

    /// Delay in hours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_hours: Option<i64>,

    /// Delay in days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_days: Option<i64>,
}

impl ScheduledStep {
    /// Total additive delay of the step, `None` when it does not fit a `Duration`
    pub fn delay(&self) -> Option<Duration> {
        let hours = self.delay_hours.unwrap_or(0).checked_mul(60)?;
        let days = self.delay_days.unwrap_or(0).checked_mul(1440)?;
        let minutes = self
            .delay_minutes
            .unwrap_or(0)
            .checked_add(hours)?
            .checked_add(days)?;
        Duration::try_minutes(minutes)
    }
}

/// Waits for a named external signal
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalStep {
    /// Name of the awaited signal
    pub signal_name: String,

    /// Waiting is abandoned as a failure after this many minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<i64>,
}

/// Runs a child process and waits for it to finish
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProcessStep {
    /// Definition ID of the child process
    pub sub_process_id: String,

    /// Child definition version; latest when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_process_version: Option<u32>,

    /// Child variable name to parent variable name (or literal).
    /// When absent all parent variables are passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mapping: Option<Variables>,

    /// Parent variable name to child variable name.
    /// When absent all child variables are returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<Variables>,
}

impl StepKind {
    /// The step type of this configuration
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::Business(_) => StepType::Business,
            StepKind::Interactive(_) => StepType::Interactive,
            StepKind::Decision(_) => StepType::Decision,
            StepKind::Scheduled(_) => StepType::Scheduled,
            StepKind::Signal(_) => StepType::Signal,
            StepKind::SubProcess(_) => StepType::SubProcess,
        }
    }
}

impl StepDefinition {
    /// Create a step definition without a next step
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            next_step_id: None,
            kind,
        }
    }

    /// Set the step to continue with after this one
    pub fn with_next(mut self, next_step_id: impl Into<String>) -> Self {
        self.next_step_id = Some(next_step_id.into());
        self
    }

    /// The step type of this definition
    #[inline]
    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }
}

impl ProcessDefinition {
    /// Find a step by ID
    pub fn find_step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Validate the process definition
    ///
    /// Checks structure only; loops between steps are allowed.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Process definition must have an id".to_string(),
            ));
        }

        if self.steps.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Process {} must have at least one step",
                self.id
            )));
        }

        let mut step_ids = HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(step.id.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate step ID: {}",
                    step.id
                )));
            }
        }

        if !step_ids.contains(self.start_step_id.as_str()) {
            return Err(CoreError::ValidationError(format!(
                "Start step {} does not exist",
                self.start_step_id
            )));
        }

        for step in &self.steps {
            if let Some(next) = &step.next_step_id {
                if !step_ids.contains(next.as_str()) {
                    return Err(CoreError::ValidationError(format!(
                        "Step {} references non-existent next step: {}",
                        step.id, next
                    )));
                }
            }

            match &step.kind {
                StepKind::Business(business) if business.command_name.trim().is_empty() => {
                    return Err(CoreError::ValidationError(format!(
                        "Business step {} has no command name",
                        step.id
                    )));
                }
                StepKind::Decision(decision) => {
                    if decision.routes.is_empty() {
                        return Err(CoreError::ValidationError(format!(
                            "Decision step {} has no routes",
                            step.id
                        )));
                    }
                    for route in &decision.routes {
                        if !step_ids.contains(route.target_step_id.as_str()) {
                            return Err(CoreError::ValidationError(format!(
                                "Step {} routes to non-existent step: {}",
                                step.id, route.target_step_id
                            )));
                        }
                    }
                }
                StepKind::Signal(signal) if signal.signal_name.trim().is_empty() => {
                    return Err(CoreError::ValidationError(format!(
                        "Signal step {} has no signal name",
                        step.id
                    )));
                }
                StepKind::SubProcess(sub) if sub.sub_process_id.trim().is_empty() => {
                    return Err(CoreError::ValidationError(format!(
                        "Sub-process step {} has no sub-process id",
                        step.id
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
