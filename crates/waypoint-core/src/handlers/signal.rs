use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{kind_mismatch, StepExecutionResult, StepHandler};
use crate::domain::process_definition::{StepDefinition, StepKind, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance, StepStatus};
use crate::CoreError;

/// Waits for a named signal, failing once the optional timeout elapses.
///
/// Delivery itself is handled by the engine; this handler only suspends
/// the step and enforces the timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalStepHandler;

impl SignalStepHandler {
    /// Create the handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepHandler for SignalStepHandler {
    fn step_type(&self) -> StepType {
        StepType::Signal
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::Signal(signal) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::Signal));
        };

        let now = Utc::now();
        if step_instance.status == StepStatus::WaitingForSignal {
            if let Some(timeout_at) = step_instance.scheduled_for {
                if now >= timeout_at {
                    warn!(
                        process_instance_id = %process_instance.id,
                        step_id = %step.id,
                        signal = %signal.signal_name,
                        "Signal wait timed out"
                    );
                    return Ok(StepExecutionResult::failed(format!(
                        "Timeout waiting for signal: {}",
                        signal.signal_name
                    )));
                }
            }
            return Ok(StepExecutionResult::wait_for_signal(
                signal.signal_name.clone(),
                step_instance.scheduled_for,
            ));
        }

        let timeout_at = match signal.timeout_minutes {
            Some(minutes) => match Duration::try_minutes(minutes)
                .and_then(|timeout| now.checked_add_signed(timeout))
            {
                Some(at) => Some(at),
                None => {
                    return Ok(StepExecutionResult::failed(format!(
                        "Invalid signal timeout for step {}: {} minutes",
                        step.id, minutes
                    )))
                }
            },
            None => None,
        };
        debug!(
            process_instance_id = %process_instance.id,
            step_id = %step.id,
            signal = %signal.signal_name,
            timeout_at = ?timeout_at,
            "Waiting for signal"
        );
        Ok(StepExecutionResult::wait_for_signal(
            signal.signal_name.clone(),
            timeout_at,
        ))
    }
}
