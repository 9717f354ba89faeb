//! # Orchestration Service Contract
//!
//! The operations deciders, workers and registrars consume from the
//! orchestration service. Backends guarantee:
//!
//! - history events of one execution are strictly ordered and numbered from 1
//! - at most one decision task per execution is in flight at any time
//! - every task is delivered at least once; a token is retired once its task
//!   completes, fails or times out, and later responses with it are rejected
//! - activity and decision timeouts are enforced by the service, not by the
//!   components doing the work

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::MessagingResult;
use super::message::{
    ActivityTask, DecisionTask, DomainRegistration, HeartbeatStatus, StartExecutionRequest,
    TaskToken,
};
use crate::models::{
    ActivityDefinition, Decision, ExecutionInfo, HistoryEvent, RegisteredDefinition,
    WorkflowDefinition, WorkflowExecution,
};

#[async_trait]
pub trait OrchestrationService: Send + Sync {
    /// Register a domain; registering an existing domain is a no-op
    async fn register_domain(&self, domain: &DomainRegistration) -> MessagingResult<()>;

    /// Register a new activity type; fails if `(name, version)` exists
    async fn register_activity_definition(
        &self,
        domain: &str,
        definition: &ActivityDefinition,
    ) -> MessagingResult<()>;

    /// Register a new workflow type; fails if `(name, version)` exists
    async fn register_workflow_definition(
        &self,
        domain: &str,
        definition: &WorkflowDefinition,
    ) -> MessagingResult<()>;

    async fn list_definitions(&self, domain: &str) -> MessagingResult<Vec<RegisteredDefinition>>;

    async fn start_workflow_execution(
        &self,
        domain: &str,
        request: StartExecutionRequest,
    ) -> MessagingResult<WorkflowExecution>;

    async fn describe_workflow_execution(&self, run_id: Uuid) -> MessagingResult<ExecutionInfo>;

    async fn get_workflow_execution_history(
        &self,
        run_id: Uuid,
    ) -> MessagingResult<Vec<HistoryEvent>>;

    /// Long-poll for a decision task; `None` when the poll timeout elapses
    async fn poll_for_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<DecisionTask>>;

    /// Close a decision task, applying its decisions in order
    async fn respond_decision_task_completed(
        &self,
        task_token: TaskToken,
        decisions: Vec<Decision>,
    ) -> MessagingResult<()>;

    /// Long-poll for an activity task; `None` when the poll timeout elapses
    async fn poll_for_activity_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<ActivityTask>>;

    async fn respond_activity_task_completed(
        &self,
        task_token: TaskToken,
        result: Option<String>,
    ) -> MessagingResult<()>;

    async fn respond_activity_task_failed(
        &self,
        task_token: TaskToken,
        reason: &str,
        details: &str,
    ) -> MessagingResult<()>;

    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
        details: Option<String>,
    ) -> MessagingResult<HeartbeatStatus>;
}
