use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{kind_mismatch, StepExecutionResult, StepHandler};
use crate::domain::process_definition::{ScheduledStep, StepDefinition, StepKind, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance, StepStatus};
use crate::types::{parse_timestamp, Variables};
use crate::CoreError;

/// Waits until a computed resume time
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduledStepHandler;

impl ScheduledStepHandler {
    /// Create the handler
    pub fn new() -> Self {
        Self
    }

    /// Resume time for a step entered at `now`, `None` when the delay overflows
    fn resume_time(
        step_id: &str,
        scheduled: &ScheduledStep,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match &scheduled.schedule_expression {
            Some(expression) if !expression.trim().is_empty() => {
                Some(parse_timestamp(expression).unwrap_or_else(|| {
                    warn!(
                        step_id,
                        expression = %expression,
                        "Unparsable schedule expression, resuming in one minute"
                    );
                    now + Duration::minutes(1)
                }))
            }
            _ => scheduled
                .delay()
                .and_then(|delay| now.checked_add_signed(delay)),
        }
    }
}

#[async_trait]
impl StepHandler for ScheduledStepHandler {
    fn step_type(&self) -> StepType {
        StepType::Scheduled
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::Scheduled(scheduled) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::Scheduled));
        };

        let now = Utc::now();
        match (step_instance.status, step_instance.scheduled_for) {
            (StepStatus::WaitingForSchedule, Some(resume_at)) => {
                if now >= resume_at {
                    Ok(StepExecutionResult::completed(
                        step.next_step_id.clone(),
                        Variables::new(),
                    ))
                } else {
                    Ok(StepExecutionResult::wait_until(resume_at))
                }
            }
            _ => {
                let Some(resume_at) = Self::resume_time(&step.id, scheduled, now) else {
                    return Ok(StepExecutionResult::failed(format!(
                        "Invalid schedule delay for step: {}",
                        step.id
                    )));
                };
                debug!(
                    process_instance_id = %process_instance.id,
                    step_id = %step.id,
                    resume_at = %resume_at,
                    "Step scheduled"
                );
                Ok(StepExecutionResult::wait_until(resume_at))
            }
        }
    }
}
