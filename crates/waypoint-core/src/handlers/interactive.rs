use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{kind_mismatch, merge_over, StepExecutionResult, StepHandler};
use crate::domain::process_definition::{InteractiveStep, StepDefinition, StepKind, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance, StepStatus, TaskInstance};
use crate::domain::repository::TaskRepository;
use crate::domain::services::TaskService;
use crate::types::Variables;
use crate::CoreError;

/// Creates a human task and waits for it to be completed
pub struct InteractiveStepHandler {
    task_service: Arc<dyn TaskService>,
    task_repo: Arc<dyn TaskRepository>,
}

impl InteractiveStepHandler {
    /// Create a handler using `task_service` to issue tasks and `task_repo` to track them
    pub fn new(task_service: Arc<dyn TaskService>, task_repo: Arc<dyn TaskRepository>) -> Self {
        Self {
            task_service,
            task_repo,
        }
    }

    async fn begin(
        &self,
        interactive: &InteractiveStep,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let task_data = merge_over(&process_instance.variables, &interactive.task_data);

        let task_id = match self
            .task_service
            .create_task(
                &process_instance.id,
                &step_instance.id,
                &interactive.task_type,
                &interactive.default_role,
                &task_data,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    process_instance_id = %process_instance.id,
                    step_id = %step.id,
                    error = %e,
                    "Task creation failed"
                );
                return Ok(StepExecutionResult::failed(e.to_string()));
            }
        };

        let task = TaskInstance {
            id: task_id,
            process_instance_id: process_instance.id.clone(),
            step_instance_id: step_instance.id.clone(),
            task_type: interactive.task_type.clone(),
            assigned_role: interactive.default_role.clone(),
            assigned_user_id: None,
            created_at: Utc::now(),
            completed_at: None,
            task_data,
            completion_data: None,
            is_completed: false,
        };
        self.task_repo.create(&task).await?;

        debug!(
            process_instance_id = %process_instance.id,
            step_id = %step.id,
            task_id = %task.id,
            role = %task.assigned_role,
            "Task created"
        );
        Ok(StepExecutionResult::wait())
    }

    async fn find_task(&self, step_instance: &StepInstance) -> Result<Option<TaskInstance>, CoreError> {
        let tasks = self
            .task_repo
            .find_by_process_instance_id(&step_instance.process_instance_id)
            .await?;
        Ok(tasks
            .into_iter()
            .find(|task| task.step_instance_id == step_instance.id))
    }
}

#[async_trait]
impl StepHandler for InteractiveStepHandler {
    fn step_type(&self) -> StepType {
        StepType::Interactive
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::Interactive(interactive) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::Interactive));
        };

        if step_instance.status == StepStatus::NotStarted {
            return self
                .begin(interactive, step, process_instance, step_instance)
                .await;
        }

        // A step interrupted before its task was recorded starts over
        let Some(task) = self.find_task(step_instance).await? else {
            if step_instance.status == StepStatus::WaitingForTask {
                return Ok(StepExecutionResult::failed(format!(
                    "Task not found for step instance: {}",
                    step_instance.id
                )));
            }
            return self
                .begin(interactive, step, process_instance, step_instance)
                .await;
        };

        if task.is_completed {
            let output = task.completion_data.unwrap_or_else(Variables::new);
            Ok(StepExecutionResult::completed(step.next_step_id.clone(), output))
        } else {
            Ok(StepExecutionResult::wait())
        }
    }
}
