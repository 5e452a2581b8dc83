use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{kind_mismatch, StepExecutionResult, StepHandler};
use crate::domain::process_definition::{StepDefinition, StepKind, StepType, SubProcessStep};
use crate::domain::process_instance::{ProcessInstance, ProcessStatus, StepInstance, StepStatus};
use crate::domain::repository::{ProcessDefinitionRepository, ProcessInstanceRepository};
use crate::types::{Value, Variables};
use crate::CoreError;

/// Step output key holding the child process instance ID
pub const SUB_PROCESS_INSTANCE_KEY: &str = "subProcessInstanceId";

/// Starts a child process and waits for it to finish.
///
/// The child is created `NotStarted`; the engine runs it once the parent
/// has suspended and resumes the parent when the child terminates.
pub struct SubProcessStepHandler {
    definition_repo: Arc<dyn ProcessDefinitionRepository>,
    instance_repo: Arc<dyn ProcessInstanceRepository>,
}

impl SubProcessStepHandler {
    /// Create a handler resolving children through the given repositories
    pub fn new(
        definition_repo: Arc<dyn ProcessDefinitionRepository>,
        instance_repo: Arc<dyn ProcessInstanceRepository>,
    ) -> Self {
        Self {
            definition_repo,
            instance_repo,
        }
    }

    async fn begin(
        &self,
        sub: &SubProcessStep,
        step: &StepDefinition,
        parent: &ProcessInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let Some(definition) = self
            .definition_repo
            .find_by_id(&sub.sub_process_id, sub.sub_process_version)
            .await?
        else {
            return Ok(StepExecutionResult::failed(format!(
                "Sub-process definition not found: {}",
                sub.sub_process_id
            )));
        };

        let input = map_input(sub.input_mapping.as_ref(), &parent.variables);
        let child = ProcessInstance::new_child(&definition, input, &parent.id);
        self.instance_repo.create(&child).await?;

        debug!(
            process_instance_id = %parent.id,
            step_id = %step.id,
            child_id = %child.id,
            sub_process = %definition.id,
            version = definition.version,
            "Sub-process created"
        );

        let mut output = Variables::new();
        output.insert(SUB_PROCESS_INSTANCE_KEY.to_string(), Value::String(child.id));
        Ok(StepExecutionResult::wait().with_output(output))
    }
}

/// Child input variables. Without a mapping every parent variable is passed;
/// otherwise a mapping value naming a parent variable copies it and any
/// other value is used literally.
fn map_input(mapping: Option<&Variables>, parent: &Variables) -> Variables {
    let Some(mapping) = mapping else {
        return parent.clone();
    };
    mapping
        .iter()
        .map(|(child_key, source)| {
            let value = match source {
                Value::String(name) => parent.get(name).cloned().unwrap_or_else(|| source.clone()),
                literal => literal.clone(),
            };
            (child_key.clone(), value)
        })
        .collect()
}

/// Variables returned to the parent. Without a mapping every child variable
/// is returned; otherwise only mapped child variables that exist are copied.
fn map_output(mapping: Option<&Variables>, child: &Variables) -> Variables {
    let Some(mapping) = mapping else {
        return child.clone();
    };
    mapping
        .iter()
        .filter_map(|(parent_key, source)| {
            let name = source.as_str()?;
            child.get(name).map(|value| (parent_key.clone(), value.clone()))
        })
        .collect()
}

#[async_trait]
impl StepHandler for SubProcessStepHandler {
    fn step_type(&self) -> StepType {
        StepType::SubProcess
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::SubProcess(sub) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::SubProcess));
        };

        let child_id = step_instance
            .output_data
            .get(SUB_PROCESS_INSTANCE_KEY)
            .and_then(Value::as_str);

        let child_id = match (step_instance.status, child_id) {
            (_, Some(id)) => id,
            (StepStatus::WaitingForTask, None) => {
                return Ok(StepExecutionResult::failed(format!(
                    "Sub-process instance id not found on step instance: {}",
                    step_instance.id
                )));
            }
            (_, None) => return self.begin(sub, step, process_instance).await,
        };

        let Some(child) = self.instance_repo.find_by_id(child_id).await? else {
            return Ok(StepExecutionResult::failed(format!(
                "Sub-process instance not found: {}",
                child_id
            )));
        };

        match child.status {
            ProcessStatus::Completed => Ok(StepExecutionResult::completed(
                step.next_step_id.clone(),
                map_output(sub.output_mapping.as_ref(), &child.variables),
            )),
            ProcessStatus::Failed => Ok(StepExecutionResult::failed(format!(
                "Sub-process failed: {}",
                child.error_message.as_deref().unwrap_or("unknown error")
            ))),
            ProcessStatus::Cancelled => Ok(StepExecutionResult::failed(format!(
                "Sub-process cancelled: {}",
                child.id
            ))),
            ProcessStatus::NotStarted | ProcessStatus::Running | ProcessStatus::Waiting => {
                Ok(StepExecutionResult::wait())
            }
        }
    }
}
