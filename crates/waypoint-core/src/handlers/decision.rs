use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{kind_mismatch, merge_over, StepExecutionResult, StepHandler};
use crate::condition::ConditionEvaluator;
use crate::domain::process_definition::{StepDefinition, StepKind, StepType};
use crate::domain::process_instance::{ProcessInstance, StepInstance};
use crate::domain::services::QueryExecutor;
use crate::CoreError;

/// Runs a query and picks the first route whose condition holds
pub struct DecisionStepHandler {
    query_executor: Arc<dyn QueryExecutor>,
    condition_evaluator: Arc<dyn ConditionEvaluator>,
}

impl DecisionStepHandler {
    /// Create a handler backed by `query_executor`
    pub fn new(
        query_executor: Arc<dyn QueryExecutor>,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        Self {
            query_executor,
            condition_evaluator,
        }
    }
}

#[async_trait]
impl StepHandler for DecisionStepHandler {
    fn step_type(&self) -> StepType {
        StepType::Decision
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        _step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        let StepKind::Decision(decision) = &step.kind else {
            return Ok(kind_mismatch(step, StepType::Decision));
        };

        let parameters = merge_over(&process_instance.variables, &decision.parameters);
        let query_result = match self
            .query_executor
            .execute(&decision.query_name, &parameters)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    process_instance_id = %process_instance.id,
                    step_id = %step.id,
                    query = %decision.query_name,
                    error = %e,
                    "Query failed"
                );
                return Ok(StepExecutionResult::failed(e.to_string()));
            }
        };

        let context = merge_over(&process_instance.variables, &query_result);

        // Stable sort keeps declaration order among equal priorities
        let mut routes: Vec<_> = decision.routes.iter().collect();
        routes.sort_by_key(|route| route.priority);

        match routes
            .into_iter()
            .find(|route| self.condition_evaluator.evaluate(&route.condition, &context))
        {
            Some(route) => {
                debug!(
                    process_instance_id = %process_instance.id,
                    step_id = %step.id,
                    target = %route.target_step_id,
                    condition = %route.condition,
                    "Decision route selected"
                );
                Ok(StepExecutionResult::completed(
                    Some(route.target_step_id.clone()),
                    query_result,
                ))
            }
            None => Ok(StepExecutionResult::failed(format!(
                "No matching route for decision step: {}",
                step.id
            ))),
        }
    }
}
