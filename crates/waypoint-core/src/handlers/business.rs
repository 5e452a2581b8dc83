use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{kind_mismatch, merge_over, StepExecutionResult, StepHandler};
use crate::domain::process_definition::{StepDefinition, StepKind, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance};
use crate::domain::services::CommandExecutor;
use crate::CoreError;

/// Runs business steps through the command executor
pub struct BusinessStepHandler {
    command_executor: Arc<dyn CommandExecutor>,
}

impl BusinessStepHandler {
    /// Create a handler backed by `command_executor`
    pub fn new(command_executor: Arc<dyn CommandExecutor>) -> Self {
        Self { command_executor }
    }
}

#[async_trait]
impl StepHandler for BusinessStepHandler {
    fn step_type(&self) -> StepType {
        StepType::Business
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        _step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::Business(business) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::Business));
        };

        let parameters = merge_over(&process_instance.variables, &business.parameters);
        debug!(
            process_instance_id = %process_instance.id,
            step_id = %step.id,
            command = %business.command_name,
            "Executing command"
        );

        match self
            .command_executor
            .execute(&business.command_name, &parameters)
            .await
        {
            Ok(output) => Ok(StepExecutionResult::completed(step.next_step_id.clone(), output)),
            Err(e) => {
                warn!(
                    process_instance_id = %process_instance.id,
                    step_id = %step.id,
                    command = %business.command_name,
                    error = %e,
                    "Command failed"
                );
                Ok(StepExecutionResult::failed(e.to_string()))
            }
        }
    }
}
