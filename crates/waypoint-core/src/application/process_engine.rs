use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::events::{DomainEventHandler, ProcessEvent};
use crate::domain::process_instance::{ProcessInstance, ProcessStatus, StepInstance, StepStatus};
use crate::domain::repository::Repositories;
use crate::handlers::{StepHandlerRegistry, SUB_PROCESS_INSTANCE_KEY};
use crate::types::{Value, Variables};
use crate::CoreError;

/// Work to do for a related instance once the current instance's lock is released
#[derive(Debug, Clone, PartialEq, Eq)]
enum FollowUp {
    None,
    /// A sub-process step suspended on this child
    StartChild(String),
    /// A child reached a terminal status
    ResumeParent(String),
}

/// Drives process instances through their steps.
///
/// Every entry point runs until the instance suspends or terminates and
/// persists each transition through the repositories. Execution of a
/// single instance is serialized with a per-instance async lock.
#[derive(Clone)]
pub struct ProcessEngine {
    repositories: Repositories,
    handlers: StepHandlerRegistry,
    event_handler: Arc<dyn DomainEventHandler>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine").finish_non_exhaustive()
    }
}

impl ProcessEngine {
    /// Create a new process engine
    pub fn new(
        repositories: Repositories,
        handlers: StepHandlerRegistry,
        event_handler: Arc<dyn DomainEventHandler>,
    ) -> Self {
        Self {
            repositories,
            handlers,
            event_handler,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Repositories the engine persists through
    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Create an instance of a definition and run it until it suspends or terminates.
    ///
    /// Uses the latest version when `version` is `None`. Returns the instance
    /// as persisted after the first execution pass.
    pub async fn start_process(
        &self,
        definition_id: &str,
        initial_variables: Option<Variables>,
        version: Option<u32>,
    ) -> Result<ProcessInstance, CoreError> {
        let definition = self
            .repositories
            .definitions
            .find_by_id(definition_id, version)
            .await?
            .ok_or_else(|| {
                CoreError::ProcessDefinitionNotFound(match version {
                    Some(v) => format!("{} (version {})", definition_id, v),
                    None => definition_id.to_string(),
                })
            })?;

        let instance = ProcessInstance::new(&definition, initial_variables.unwrap_or_default());
        self.repositories.instances.create(&instance).await?;

        info!(
            process_instance_id = %instance.id,
            definition_id = %definition.id,
            version = definition.version,
            "Process started"
        );
        self.emit(ProcessEvent::ProcessStarted {
            process_instance_id: instance.id.clone(),
            definition_id: definition.id.clone(),
            version: definition.version,
            timestamp: Utc::now(),
        })
        .await;

        self.execute_process(&instance.id).await?;
        self.load_instance(&instance.id).await
    }

    /// Run an instance from its current step.
    ///
    /// Safe to call repeatedly: terminal instances are left untouched and
    /// waiting steps are re-checked rather than restarted.
    pub fn execute_process<'a>(
        &'a self,
        process_instance_id: &'a str,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let lock = self.lock_for(process_instance_id);
            let follow_up = {
                let _guard = lock.lock().await;
                self.run(process_instance_id).await
            };
            drop(lock);
            self.release_lock(process_instance_id);

            self.run_follow_up(follow_up?).await
        })
    }

    /// Deliver a signal to steps waiting for it, optionally scoped to one instance.
    ///
    /// Each woken step completes and its instance continues with the step's
    /// next step. Returns the IDs of the instances that were resumed.
    pub async fn send_signal(
        &self,
        signal_name: &str,
        process_instance_id: Option<&str>,
    ) -> Result<Vec<String>, CoreError> {
        // A scoped signal is matched under the instance lock by deliver_signal
        let candidates: Vec<String> = match process_instance_id {
            Some(scope) => vec![scope.to_string()],
            None => {
                let mut seen = HashSet::new();
                self.repositories
                    .steps
                    .find_waiting_for_signal(signal_name)
                    .await?
                    .into_iter()
                    .map(|step| step.process_instance_id)
                    .filter(|id| seen.insert(id.clone()))
                    .collect()
            }
        };

        let mut woken = Vec::with_capacity(candidates.len());
        for instance_id in candidates {
            let lock = self.lock_for(&instance_id);
            let delivered = {
                let _guard = lock.lock().await;
                self.deliver_signal(signal_name, &instance_id).await
            };
            drop(lock);
            self.release_lock(&instance_id);

            if delivered? {
                self.execute_process(&instance_id).await?;
                woken.push(instance_id);
            }
        }

        info!(signal = %signal_name, woken = woken.len(), "Signal delivered");
        Ok(woken)
    }

    /// Resume every instance with a due scheduled step or an elapsed signal timeout.
    ///
    /// Failures of individual instances are logged and do not stop the
    /// sweep. Returns the IDs of the instances that were re-executed.
    pub async fn process_scheduled_steps(&self) -> Result<Vec<String>, CoreError> {
        let due = self
            .repositories
            .steps
            .find_scheduled_due(Utc::now())
            .await?;

        let mut seen = HashSet::new();
        let mut processed = Vec::new();
        for step in due {
            if !seen.insert(step.process_instance_id.clone()) {
                continue;
            }
            debug!(
                process_instance_id = %step.process_instance_id,
                step_id = %step.step_definition_id,
                "Resuming due step"
            );
            match self.execute_process(&step.process_instance_id).await {
                Ok(()) => processed.push(step.process_instance_id),
                Err(e) => error!(
                    process_instance_id = %step.process_instance_id,
                    error = %e,
                    "Failed to resume scheduled step"
                ),
            }
        }
        Ok(processed)
    }

    /// Complete a human task and resume its process instance.
    ///
    /// The task's step instance must be waiting for a task.
    pub async fn complete_task(
        &self,
        task_id: &str,
        completion_data: Variables,
    ) -> Result<(), CoreError> {
        let task = self
            .repositories
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))?;

        let instance_id = task.process_instance_id.clone();
        let lock = self.lock_for(&instance_id);
        let completed = {
            let _guard = lock.lock().await;
            self.record_task_completion(task_id, completion_data).await
        };
        drop(lock);
        self.release_lock(&instance_id);
        completed?;

        self.execute_process(&instance_id).await
    }

    /// Cancel a running or waiting instance.
    ///
    /// Non-terminal step instances are marked skipped; later resumption
    /// attempts are no-ops. A waiting parent is re-checked afterwards.
    pub async fn cancel_process(&self, process_instance_id: &str) -> Result<(), CoreError> {
        let lock = self.lock_for(process_instance_id);
        let follow_up = {
            let _guard = lock.lock().await;
            self.cancel_locked(process_instance_id).await
        };
        drop(lock);
        self.release_lock(process_instance_id);

        self.run_follow_up(follow_up?).await
    }

    fn lock_for(&self, process_instance_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(process_instance_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, process_instance_id: &str) {
        self.locks
            .remove_if(process_instance_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn emit(&self, event: ProcessEvent) {
        if let Err(e) = self.event_handler.handle_event(Box::new(event)).await {
            warn!(error = %e, "Event handler failed");
        }
    }

    async fn load_instance(&self, process_instance_id: &str) -> Result<ProcessInstance, CoreError> {
        self.repositories
            .instances
            .find_by_id(process_instance_id)
            .await?
            .ok_or_else(|| CoreError::ProcessInstanceNotFound(process_instance_id.to_string()))
    }

    /// The execution loop. Must be called with the instance lock held.
    async fn run(&self, process_instance_id: &str) -> Result<FollowUp, CoreError> {
        let mut instance = self.load_instance(process_instance_id).await?;
        if instance.is_terminal() {
            debug!(
                process_instance_id,
                status = ?instance.status,
                "Instance is terminal, nothing to execute"
            );
            return Ok(FollowUp::None);
        }

        let Some(definition) = self
            .repositories
            .definitions
            .find_by_id(&instance.process_definition_id, Some(instance.process_version))
            .await?
        else {
            let message = format!(
                "Process definition not found: {} (version {})",
                instance.process_definition_id, instance.process_version
            );
            return self.fail_instance(&mut instance, None, message).await;
        };

        instance.status = ProcessStatus::Running;
        self.repositories.instances.update(&instance).await?;

        while let Some(step_id) = instance.current_step_id.clone() {
            let Some(step) = definition.find_step(&step_id) else {
                let message = format!("Step not found: {}", step_id);
                return self.fail_instance(&mut instance, Some(step_id), message).await;
            };

            let existing = self
                .repositories
                .steps
                .find_by_process_instance_id(&instance.id)
                .await?
                .into_iter()
                .find(|s| s.step_definition_id == step.id && !s.status.is_terminal());

            let mut step_instance = match existing {
                Some(step_instance) => step_instance,
                None => {
                    let step_instance =
                        StepInstance::new(&instance.id, step, instance.variables.clone());
                    self.repositories.steps.create(&step_instance).await?;
                    step_instance
                }
            };

            // Handlers branch on the status as it was before this pass. A
            // re-checked wait stays persisted as waiting so signal lookups
            // still find it while the handler runs.
            let observed = step_instance.clone();
            if !observed.status.is_waiting() {
                step_instance.status = StepStatus::Running;
                self.repositories.steps.update(&step_instance).await?;
            }

            let Some(handler) = self.handlers.get(step.step_type()) else {
                let message = format!("Handler not found for step type: {}", step.step_type());
                step_instance.fail(message.clone());
                self.repositories.steps.update(&step_instance).await?;
                return self.fail_instance(&mut instance, Some(step_id), message).await;
            };

            debug!(
                process_instance_id = %instance.id,
                step_id = %step.id,
                step_type = %step.step_type(),
                observed_status = ?observed.status,
                "Executing step"
            );
            self.emit(ProcessEvent::StepStarted {
                process_instance_id: instance.id.clone(),
                step_id: step.id.clone(),
                step_type: step.step_type(),
                timestamp: Utc::now(),
            })
            .await;

            let result = handler.execute(step, &instance, &observed).await?;

            if result.requires_wait {
                step_instance.status = result.wait_status();
                step_instance.scheduled_for = result.resume_at;
                step_instance.waiting_for_signal = result.waiting_for_signal.clone();
                step_instance.output_data.extend(result.output_data);
                self.repositories.steps.update(&step_instance).await?;

                instance.status = ProcessStatus::Waiting;
                self.repositories.instances.update(&instance).await?;

                debug!(
                    process_instance_id = %instance.id,
                    step_id = %step.id,
                    status = ?step_instance.status,
                    "Process waiting"
                );
                self.emit(ProcessEvent::ProcessWaiting {
                    process_instance_id: instance.id.clone(),
                    step_id: step.id.clone(),
                    timestamp: Utc::now(),
                })
                .await;

                return Ok(match step_instance.output_data.get(SUB_PROCESS_INSTANCE_KEY) {
                    Some(Value::String(child_id)) => FollowUp::StartChild(child_id.clone()),
                    _ => FollowUp::None,
                });
            }

            if !result.is_completed {
                let message = result
                    .error_message
                    .unwrap_or_else(|| format!("Step {} failed", step.id));
                step_instance.fail(message.clone());
                self.repositories.steps.update(&step_instance).await?;
                return self.fail_instance(&mut instance, Some(step_id), message).await;
            }

            step_instance.complete(result.output_data.clone());
            self.repositories.steps.update(&step_instance).await?;

            instance.merge_variables(&result.output_data);
            instance.current_step_id = result.next_step_id.clone();
            self.repositories.instances.update(&instance).await?;

            self.emit(ProcessEvent::StepCompleted {
                process_instance_id: instance.id.clone(),
                step_id: step.id.clone(),
                next_step_id: result.next_step_id,
                timestamp: Utc::now(),
            })
            .await;
        }

        instance.complete();
        self.repositories.instances.update(&instance).await?;
        info!(process_instance_id = %instance.id, "Process completed");
        self.emit(ProcessEvent::ProcessCompleted {
            process_instance_id: instance.id.clone(),
            timestamp: Utc::now(),
        })
        .await;

        Ok(Self::after_terminal(&instance))
    }

    async fn fail_instance(
        &self,
        instance: &mut ProcessInstance,
        step_id: Option<String>,
        message: String,
    ) -> Result<FollowUp, CoreError> {
        instance.fail(message.clone());
        self.repositories.instances.update(instance).await?;

        warn!(
            process_instance_id = %instance.id,
            step_id = ?step_id,
            error = %message,
            "Process failed"
        );
        self.emit(ProcessEvent::ProcessFailed {
            process_instance_id: instance.id.clone(),
            step_id,
            error: message,
            timestamp: Utc::now(),
        })
        .await;

        Ok(Self::after_terminal(instance))
    }

    fn after_terminal(instance: &ProcessInstance) -> FollowUp {
        match &instance.parent_process_instance_id {
            Some(parent_id) => FollowUp::ResumeParent(parent_id.clone()),
            None => FollowUp::None,
        }
    }

    async fn run_follow_up(&self, follow_up: FollowUp) -> Result<(), CoreError> {
        match follow_up {
            FollowUp::None => Ok(()),
            FollowUp::StartChild(child_id) => {
                let child = self.repositories.instances.find_by_id(&child_id).await?;
                match child {
                    Some(child) if child.status == ProcessStatus::NotStarted => {
                        debug!(process_instance_id = %child_id, "Starting sub-process");
                        self.execute_process(&child_id).await
                    }
                    _ => Ok(()),
                }
            }
            FollowUp::ResumeParent(parent_id) => {
                debug!(process_instance_id = %parent_id, "Resuming parent process");
                match self.execute_process(&parent_id).await {
                    Err(CoreError::ProcessInstanceNotFound(id)) => {
                        warn!(process_instance_id = %id, "Parent process instance not found");
                        Ok(())
                    }
                    other => other,
                }
            }
        }
    }

    /// Complete the matching signal steps of one instance and advance it
    /// past them. Returns whether anything was delivered.
    async fn deliver_signal(&self, signal_name: &str, process_instance_id: &str) -> Result<bool, CoreError> {
        let Some(mut instance) = self
            .repositories
            .instances
            .find_by_id(process_instance_id)
            .await?
        else {
            return Ok(false);
        };
        if instance.is_terminal() {
            return Ok(false);
        }

        let waiting: Vec<StepInstance> = self
            .repositories
            .steps
            .find_by_process_instance_id(process_instance_id)
            .await?
            .into_iter()
            .filter(|s| {
                s.status == StepStatus::WaitingForSignal
                    && s.waiting_for_signal.as_deref() == Some(signal_name)
            })
            .collect();
        if waiting.is_empty() {
            return Ok(false);
        }

        let definition = self
            .repositories
            .definitions
            .find_by_id(&instance.process_definition_id, Some(instance.process_version))
            .await?;

        for mut step in waiting {
            step.status = StepStatus::Completed;
            step.completed_at = Some(Utc::now());
            self.repositories.steps.update(&step).await?;

            if instance.current_step_id.as_deref() == Some(step.step_definition_id.as_str()) {
                instance.current_step_id = definition
                    .as_ref()
                    .and_then(|d| d.find_step(&step.step_definition_id))
                    .and_then(|s| s.next_step_id.clone());
            }
        }
        self.repositories.instances.update(&instance).await?;

        self.emit(ProcessEvent::SignalDelivered {
            process_instance_id: instance.id.clone(),
            signal_name: signal_name.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(true)
    }

    async fn record_task_completion(
        &self,
        task_id: &str,
        completion_data: Variables,
    ) -> Result<(), CoreError> {
        // Re-read under the lock so two completions cannot both succeed
        let mut task = self
            .repositories
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))?;
        if task.is_completed {
            return Err(CoreError::InvalidState(format!(
                "Task {} is already completed",
                task_id
            )));
        }

        let step = self
            .repositories
            .steps
            .find_by_id(&task.step_instance_id)
            .await?
            .ok_or_else(|| CoreError::StepInstanceNotFound(task.step_instance_id.clone()))?;
        if step.status != StepStatus::WaitingForTask {
            return Err(CoreError::InvalidState(format!(
                "Step instance {} is not waiting for a task (status {:?})",
                step.id, step.status
            )));
        }

        task.complete(completion_data);
        self.repositories.tasks.update(&task).await?;

        info!(
            process_instance_id = %task.process_instance_id,
            task_id,
            "Task completed"
        );
        self.emit(ProcessEvent::TaskCompleted {
            process_instance_id: task.process_instance_id.clone(),
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn cancel_locked(&self, process_instance_id: &str) -> Result<FollowUp, CoreError> {
        let mut instance = self.load_instance(process_instance_id).await?;
        if instance.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "Process instance {} is already {:?}",
                process_instance_id, instance.status
            )));
        }

        let steps = self
            .repositories
            .steps
            .find_by_process_instance_id(process_instance_id)
            .await?;
        for mut step in steps.into_iter().filter(|s| !s.status.is_terminal()) {
            step.skip();
            self.repositories.steps.update(&step).await?;
        }

        instance.cancel();
        self.repositories.instances.update(&instance).await?;

        info!(process_instance_id, "Process cancelled");
        self.emit(ProcessEvent::ProcessCancelled {
            process_instance_id: instance.id.clone(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(Self::after_terminal(&instance))
    }
}
