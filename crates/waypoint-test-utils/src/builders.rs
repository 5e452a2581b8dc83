//! Builders for process definitions used in tests.

use waypoint_core::{
    BusinessStep, DecisionRoute, DecisionStep, InteractiveStep, ProcessDefinition, ScheduledStep,
    SignalStep, StepDefinition, StepKind, SubProcessStep, Variables,
};

/// Fluent builder for [`ProcessDefinition`].
///
/// The start step defaults to the first step added.
///
/// ```
/// use waypoint_test_utils::DefinitionBuilder;
///
/// let definition = DefinitionBuilder::new("order")
///     .business("reserve", "ReserveStock", Some("ship"))
///     .business("ship", "ShipOrder", None)
///     .build();
/// assert_eq!(definition.start_step_id, "reserve");
/// ```
#[derive(Debug, Clone)]
pub struct DefinitionBuilder {
    definition: ProcessDefinition,
    start_set: bool,
}

impl DefinitionBuilder {
    /// Start a version 1 definition with the given id
    pub fn new(id: &str) -> Self {
        Self {
            definition: ProcessDefinition {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                version: 1,
                start_step_id: String::new(),
                steps: Vec::new(),
            },
            start_set: false,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: &str) -> Self {
        self.definition.name = name.to_string();
        self
    }

    /// Set the version
    pub fn version(mut self, version: u32) -> Self {
        self.definition.version = version;
        self
    }

    /// Set the start step explicitly
    pub fn start(mut self, step_id: &str) -> Self {
        self.definition.start_step_id = step_id.to_string();
        self.start_set = true;
        self
    }

    /// Add a step
    pub fn step(mut self, step: StepDefinition) -> Self {
        if !self.start_set && self.definition.steps.is_empty() {
            self.definition.start_step_id = step.id.clone();
        }
        self.definition.steps.push(step);
        self
    }

    fn kind(self, id: &str, kind: StepKind, next: Option<&str>) -> Self {
        let mut step = StepDefinition::new(id, id, kind);
        step.next_step_id = next.map(str::to_string);
        self.step(step)
    }

    /// Add a business step without parameters
    pub fn business(self, id: &str, command_name: &str, next: Option<&str>) -> Self {
        self.business_with(id, command_name, Variables::new(), next)
    }

    /// Add a business step with parameters
    pub fn business_with(
        self,
        id: &str,
        command_name: &str,
        parameters: Variables,
        next: Option<&str>,
    ) -> Self {
        self.kind(
            id,
            StepKind::Business(BusinessStep {
                command_name: command_name.to_string(),
                parameters,
            }),
            next,
        )
    }

    /// Add an interactive step
    pub fn interactive(self, id: &str, task_type: &str, role: &str, next: Option<&str>) -> Self {
        self.kind(
            id,
            StepKind::Interactive(InteractiveStep {
                task_type: task_type.to_string(),
                default_role: role.to_string(),
                task_data: Variables::new(),
            }),
            next,
        )
    }

    /// Add a decision step; routes are `(target, condition, priority)`
    pub fn decision(self, id: &str, query_name: &str, routes: &[(&str, &str, i32)]) -> Self {
        let routes = routes
            .iter()
            .map(|(target, condition, priority)| DecisionRoute {
                target_step_id: target.to_string(),
                condition: condition.to_string(),
                priority: *priority,
            })
            .collect();
        self.kind(
            id,
            StepKind::Decision(DecisionStep {
                query_name: query_name.to_string(),
                parameters: Variables::new(),
                routes,
            }),
            None,
        )
    }

    /// Add a scheduled step
    pub fn scheduled(self, id: &str, scheduled: ScheduledStep, next: Option<&str>) -> Self {
        self.kind(id, StepKind::Scheduled(scheduled), next)
    }

    /// Add a signal step
    pub fn signal(
        self,
        id: &str,
        signal_name: &str,
        timeout_minutes: Option<i64>,
        next: Option<&str>,
    ) -> Self {
        self.kind(
            id,
            StepKind::Signal(SignalStep {
                signal_name: signal_name.to_string(),
                timeout_minutes,
            }),
            next,
        )
    }

    /// Add a sub-process step
    pub fn sub_process(self, id: &str, sub_process: SubProcessStep, next: Option<&str>) -> Self {
        self.kind(id, StepKind::SubProcess(sub_process), next)
    }

    /// Finish the definition
    pub fn build(self) -> ProcessDefinition {
        self.definition
    }
}
