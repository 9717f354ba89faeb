use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::messaging::{
    ActivityTask, HeartbeatStatus, MessagingResult, OrchestrationService, TaskToken,
};
use crate::models::{DefinitionKey, WorkflowExecution};

/// Per-dispatch view of the task an activity is running
#[derive(Clone)]
pub struct ActivityContext {
    service: Option<Arc<dyn OrchestrationService>>,
    task_token: TaskToken,
    activity_id: String,
    activity_type: DefinitionKey,
    workflow_execution: WorkflowExecution,
    heartbeat_timeout: Option<Duration>,
}

impl ActivityContext {
    pub fn new(service: Arc<dyn OrchestrationService>, task: &ActivityTask) -> Self {
        Self {
            service: Some(service),
            task_token: task.task_token,
            activity_id: task.activity_id.clone(),
            activity_type: task.activity_type.clone(),
            workflow_execution: task.workflow_execution.clone(),
            heartbeat_timeout: task.heartbeat_timeout,
        }
    }

    /// A context with no service behind it; heartbeats always succeed
    pub fn detached(workflow_id: impl Into<String>, activity_type: DefinitionKey) -> Self {
        Self {
            service: None,
            task_token: TaskToken::generate(),
            activity_id: "0.0".to_string(),
            activity_type,
            workflow_execution: WorkflowExecution {
                workflow_id: workflow_id.into(),
                run_id: Uuid::new_v4(),
            },
            heartbeat_timeout: None,
        }
    }

    pub fn task_token(&self) -> TaskToken {
        self.task_token
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn activity_type(&self) -> &DefinitionKey {
        &self.activity_type
    }

    pub fn workflow_execution(&self) -> &WorkflowExecution {
        &self.workflow_execution
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_execution.workflow_id
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout
    }

    /// Report progress; an error means the service no longer accepts this task
    pub async fn heartbeat(&self, details: impl Into<String>) -> MessagingResult<HeartbeatStatus> {
        let details = details.into();
        debug!(
            activity_id = %self.activity_id,
            details = %details,
            "Recording activity heartbeat"
        );
        match &self.service {
            Some(service) => {
                service
                    .record_activity_heartbeat(self.task_token, Some(details))
                    .await
            }
            None => Ok(HeartbeatStatus::default()),
        }
    }
}
