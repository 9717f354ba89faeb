//! # Workflow Coordinator
//!
//! Poll loop around the [`Decider`]. Each decision task is answered exactly
//! once with the complete batch of decisions. When deciding fails the task is
//! left unanswered; the service times it out and hands it to a decider again.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::decider::{DecisionOutcome, Decider};
use crate::error::{Result, WorkflowError};
use crate::logging::log_decision_cycle;
use crate::messaging::{DecisionTask, OrchestrationService};
use crate::models::Decision;

#[derive(Debug, Clone)]
pub struct WorkflowCoordinatorConfig {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    /// Pause after a failed poll before polling again
    pub poll_error_backoff: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub decision_tasks: u64,
    pub decisions_sent: u64,
    pub decide_errors: u64,
    pub respond_errors: u64,
    pub poll_errors: u64,
}

pub struct WorkflowCoordinator {
    service: Arc<dyn OrchestrationService>,
    decider: Arc<Decider>,
    config: WorkflowCoordinatorConfig,
}

impl WorkflowCoordinator {
    pub fn new(
        service: Arc<dyn OrchestrationService>,
        decider: Arc<Decider>,
        config: WorkflowCoordinatorConfig,
    ) -> Self {
        Self {
            service,
            decider,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowCoordinatorConfig {
        &self.config
    }

    /// Poll and decide until `shutdown` is cancelled
    #[instrument(skip(self, shutdown), fields(task_list = %self.config.task_list, identity = %self.config.identity))]
    pub async fn run(&self, shutdown: CancellationToken) -> CoordinatorStats {
        info!("🧭 Starting decision task loop");
        let mut stats = CoordinatorStats::default();

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll() => polled,
            };

            match polled {
                Ok(Some(task)) => {
                    stats.decision_tasks += 1;
                    match self.handle(&task).await {
                        Ok(outcome) => stats.decisions_sent += outcome.decisions.len() as u64,
                        Err(WorkflowError::DecisionError(_)) => stats.decide_errors += 1,
                        Err(_) => stats.respond_errors += 1,
                    }
                }
                Ok(None) => debug!("Decision poll timed out, polling again"),
                Err(err) => {
                    stats.poll_errors += 1;
                    warn!(error = %err, "Decision task poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_error_backoff) => {}
                    }
                }
            }
        }

        info!(
            decision_tasks = stats.decision_tasks,
            decisions_sent = stats.decisions_sent,
            "🛑 Decision task loop stopped"
        );
        stats
    }

    /// Handle at most one decision task; `None` when the poll timed out
    pub async fn poll_once(&self) -> Result<Option<DecisionOutcome>> {
        match self.poll().await? {
            Some(task) => self.handle(&task).await.map(Some),
            None => Ok(None),
        }
    }

    async fn poll(&self) -> Result<Option<DecisionTask>> {
        Ok(self
            .service
            .poll_for_decision_task(
                &self.config.domain,
                &self.config.task_list,
                &self.config.identity,
            )
            .await?)
    }

    #[instrument(skip(self, task), fields(workflow_id = %task.workflow_execution.workflow_id, run_id = %task.workflow_execution.run_id))]
    async fn handle(&self, task: &DecisionTask) -> Result<DecisionOutcome> {
        let outcome = match self.decider.decide(task) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    error = %err,
                    started_event_id = task.started_event_id,
                    "Decision failed, leaving the task for redelivery"
                );
                return Err(err.into());
            }
        };

        let decision_types: Vec<&str> = outcome
            .decisions
            .iter()
            .map(Decision::decision_type)
            .collect();
        log_decision_cycle(
            &task.workflow_execution.workflow_id,
            &task.workflow_execution.run_id.to_string(),
            outcome.new_events,
            &decision_types,
            &outcome.state.to_string(),
            outcome.cursor,
        );

        if let Err(err) = self
            .service
            .respond_decision_task_completed(task.task_token, outcome.decisions.clone())
            .await
        {
            warn!(error = %err, "Decision task response rejected");
            return Err(err.into());
        }
        Ok(outcome)
    }
}
