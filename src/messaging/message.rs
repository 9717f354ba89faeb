//! # Task Messages
//!
//! Units of work handed out by the orchestration service and the requests
//! that create executions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{DefinitionKey, HistoryEvent, WorkflowExecution};

/// Opaque handle identifying one delivery of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskToken(Uuid);

impl TaskToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scheduled activity delivered to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTask {
    pub task_token: TaskToken,
    pub activity_id: String,
    pub activity_type: DefinitionKey,
    pub input: Option<String>,
    pub workflow_execution: WorkflowExecution,
    pub started_event_id: i64,
    pub heartbeat_timeout: Option<Duration>,
}

/// "New events are available for this execution"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTask {
    pub task_token: TaskToken,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: DefinitionKey,
    /// The full history up to and including this task's start event
    pub events: Vec<HistoryEvent>,
    /// Start event of the last decision task that completed, 0 if none did
    pub previous_started_event_id: i64,
    pub started_event_id: i64,
}

impl DecisionTask {
    /// Events the previous completed decision task has not seen
    pub fn new_events(&self) -> impl Iterator<Item = &HistoryEvent> {
        let previous = self.previous_started_event_id;
        self.events.iter().filter(move |e| e.event_id > previous)
    }
}

/// Reply to a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartExecutionRequest {
    pub workflow_id: String,
    pub workflow_type: DefinitionKey,
    pub input: Option<String>,
    /// Overrides the workflow definition's default decision task list
    pub task_list: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRegistration {
    pub name: String,
    pub description: Option<String>,
    pub retention_days: u32,
}
