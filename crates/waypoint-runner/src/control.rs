//! Line-delimited JSON control channel.
//!
//! Each input line is one [`ControlRequest`], tagged by `op`; each produces
//! one [`ControlResponse`] line. This is how a host starts processes,
//! delivers signals and completes tasks on a running engine.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use waypoint_core::{
    CoreError, ProcessEngine, ProcessInstance, StepInstance, TaskInstance, Variables,
};

use crate::bootstrap::StartRequest;

/// One control operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Start a process instance
    Start(StartRequest),

    /// Deliver a signal, optionally to one instance
    Signal {
        /// Signal name
        name: String,
        /// Instance to deliver to; every waiting instance when absent
        #[serde(default)]
        process_instance_id: Option<String>,
    },

    /// Complete a human task
    CompleteTask {
        /// Task to complete
        task_id: String,
        /// Completion payload merged into the process variables
        #[serde(default)]
        data: Variables,
    },

    /// Cancel an instance
    Cancel {
        /// Instance to cancel
        process_instance_id: String,
    },

    /// Current state of an instance and its steps
    Status {
        /// Instance to report
        process_instance_id: String,
    },
}

/// Reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the request succeeded
    pub success: bool,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Operation result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl ControlResponse {
    fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            result: Some(result),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            result: None,
        }
    }
}

/// Result of a `status` request
#[derive(Debug, Serialize)]
struct InstanceReport {
    instance: ProcessInstance,
    steps: Vec<StepInstance>,
    tasks: Vec<TaskInstance>,
}

/// Run one request against the engine
pub async fn handle(
    engine: &ProcessEngine,
    request: ControlRequest,
) -> Result<serde_json::Value, CoreError> {
    match request {
        ControlRequest::Start(start) => {
            let instance = engine
                .start_process(&start.definition_id, Some(start.variables), start.version)
                .await?;
            Ok(serde_json::to_value(&instance)?)
        }
        ControlRequest::Signal {
            name,
            process_instance_id,
        } => {
            let woken = engine
                .send_signal(&name, process_instance_id.as_deref())
                .await?;
            Ok(json!({ "woken": woken }))
        }
        ControlRequest::CompleteTask { task_id, data } => {
            engine.complete_task(&task_id, data).await?;
            Ok(json!({ "task_id": task_id, "completed": true }))
        }
        ControlRequest::Cancel {
            process_instance_id,
        } => {
            engine.cancel_process(&process_instance_id).await?;
            Ok(json!({ "process_instance_id": process_instance_id, "cancelled": true }))
        }
        ControlRequest::Status {
            process_instance_id,
        } => {
            let repositories = engine.repositories();
            let instance = repositories
                .instances
                .find_by_id(&process_instance_id)
                .await?
                .ok_or_else(|| CoreError::ProcessInstanceNotFound(process_instance_id.clone()))?;
            let steps = repositories
                .steps
                .find_by_process_instance_id(&process_instance_id)
                .await?;
            let tasks = repositories
                .tasks
                .find_by_process_instance_id(&process_instance_id)
                .await?;
            Ok(serde_json::to_value(InstanceReport {
                instance,
                steps,
                tasks,
            })?)
        }
    }
}

/// Parse and run one input line
pub async fn respond(engine: &ProcessEngine, line: &str) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected control request");
            return ControlResponse::error(format!("Invalid request: {}", e));
        }
    };
    debug!(request = ?request, "Control request");

    match handle(engine, request).await {
        Ok(result) => ControlResponse::ok(result),
        Err(e) => {
            warn!(error = %e, "Control request failed");
            ControlResponse::error(e.to_string())
        }
    }
}

/// Answer requests from `reader` on `writer` until end of input or shutdown
pub async fn serve<R, W>(
    engine: &ProcessEngine,
    reader: R,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Control input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(engine, &line).await;
                let mut encoded = serde_json::to_vec(&response)?;
                encoded.push(b'\n');
                writer.write_all(&encoded).await?;
                writer.flush().await?;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    Ok(())
}
