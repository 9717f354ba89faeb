//! # Activity Worker
//!
//! Long-polls one activity task list and runs each task on its own tokio task.
//! At most `max_concurrent_tasks` run at once; a slot must be free before the
//! worker polls again, so it never claims work it cannot start.
//!
//! Every task is reported exactly once, as completed or failed. Tasks naming
//! an activity this worker does not know are left unanswered so the service
//! can time them out.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler_registry::ActivityHandlerRegistry;
use crate::activities::{Activity, ActivityContext, ActivityOutcome};
use crate::config::WorkflowConfig;
use crate::constants::reasons;
use crate::error::Result;
use crate::logging::{log_activity_dispatch, log_error};
use crate::messaging::{ActivityTask, OrchestrationService};
use crate::models::Payload;

#[derive(Debug, Clone)]
pub struct ActivityWorkerConfig {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    pub max_concurrent_tasks: usize,
    /// How long shutdown waits for in-flight tasks before aborting them
    pub shutdown_grace: Duration,
    pub poll_error_backoff: Duration,
}

impl ActivityWorkerConfig {
    pub fn from_workflow_config(config: &WorkflowConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            task_list: config.activity_task_list(),
            identity: config.worker.identity.clone(),
            max_concurrent_tasks: config.worker.max_concurrent_tasks,
            shutdown_grace: Duration::from_millis(config.worker.shutdown_grace_ms),
            poll_error_backoff: Duration::from_millis(config.worker.poll_error_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    /// Tasks naming an activity this worker does not run
    pub unknown: u64,
    /// Outcomes the service refused, usually because the task already timed out
    pub report_errors: u64,
    /// In-flight tasks aborted when the shutdown grace period ran out
    pub aborted: u64,
}

/// What one dispatched task did
#[derive(Debug)]
struct DispatchReport {
    completed: bool,
    reported: bool,
}

pub struct ActivityWorker {
    service: Arc<dyn OrchestrationService>,
    handlers: ActivityHandlerRegistry,
    config: ActivityWorkerConfig,
    slots: Arc<Semaphore>,
}

impl ActivityWorker {
    /// Build the worker over a fixed set of activities
    pub fn register(
        service: Arc<dyn OrchestrationService>,
        activities: impl IntoIterator<Item = Arc<dyn Activity>>,
        config: ActivityWorkerConfig,
    ) -> Result<Self> {
        let handlers = ActivityHandlerRegistry::build(activities)?;
        info!(
            task_list = %config.task_list,
            activities = ?handlers.kinds(),
            max_concurrent_tasks = config.max_concurrent_tasks,
            "🔧 Activity worker registered"
        );
        let slots = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Ok(Self {
            service,
            handlers,
            config,
            slots,
        })
    }

    pub fn config(&self) -> &ActivityWorkerConfig {
        &self.config
    }

    pub fn handlers(&self) -> &ActivityHandlerRegistry {
        &self.handlers
    }

    /// Poll and dispatch until `shutdown` is cancelled, then drain in-flight tasks
    #[instrument(skip(self, shutdown), fields(task_list = %self.config.task_list, identity = %self.config.identity))]
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
        info!("🚀 Starting activity task loop");
        let mut stats = WorkerStats::default();
        let mut in_flight: JoinSet<DispatchReport> = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::tally(&mut stats, joined);
                    continue;
                }
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.service.poll_for_activity_task(
                    &self.config.domain,
                    &self.config.task_list,
                    &self.config.identity,
                ) => polled,
            };

            match polled {
                Ok(Some(task)) => self.dispatch(task, permit, &mut in_flight, &mut stats),
                Ok(None) => debug!("Activity poll timed out, polling again"),
                Err(err) => {
                    warn!(error = %err, "Activity task poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_error_backoff) => {}
                    }
                }
            }
        }

        self.drain(&mut in_flight, &mut stats).await;
        info!(
            completed = stats.completed,
            failed = stats.failed,
            unknown = stats.unknown,
            aborted = stats.aborted,
            "🛑 Activity task loop stopped"
        );
        stats
    }

    async fn drain(&self, in_flight: &mut JoinSet<DispatchReport>, stats: &mut WorkerStats) {
        if in_flight.is_empty() {
            return;
        }
        info!(
            in_flight = in_flight.len(),
            grace_ms = self.config.shutdown_grace.as_millis() as u64,
            "Waiting for in-flight activity tasks"
        );

        let waited = tokio::time::timeout(self.config.shutdown_grace, async {
            while let Some(joined) = in_flight.join_next().await {
                Self::tally(stats, joined);
            }
        })
        .await;

        if waited.is_err() {
            warn!(
                remaining = in_flight.len(),
                "Shutdown grace period elapsed, aborting activity tasks"
            );
            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next().await {
                Self::tally(stats, joined);
            }
        }
    }

    fn tally(stats: &mut WorkerStats, joined: std::result::Result<DispatchReport, JoinError>) {
        match joined {
            Ok(report) => {
                if report.completed {
                    stats.completed += 1;
                } else {
                    stats.failed += 1;
                }
                if !report.reported {
                    stats.report_errors += 1;
                }
            }
            Err(err) if err.is_cancelled() => stats.aborted += 1,
            Err(err) => {
                log_error("activity_worker", "join", &err.to_string(), None);
                stats.failed += 1;
            }
        }
    }

    fn dispatch(
        &self,
        task: ActivityTask,
        permit: OwnedSemaphorePermit,
        in_flight: &mut JoinSet<DispatchReport>,
        stats: &mut WorkerStats,
    ) {
        let Some((kind, activity)) = self.handlers.resolve(&task.activity_type.name) else {
            stats.unknown += 1;
            warn!(
                activity_type = %task.activity_type,
                activity_id = %task.activity_id,
                workflow_id = %task.workflow_execution.workflow_id,
                "Unknown activity type, leaving the task unacknowledged"
            );
            return;
        };

        log_activity_dispatch(
            kind.name(),
            &task.activity_id,
            &task.workflow_execution.workflow_id,
            "started",
            None,
            None,
        );
        let service = Arc::clone(&self.service);
        in_flight.spawn(async move {
            let _permit = permit;
            Self::execute(service, activity, task).await
        });
    }

    async fn execute(
        service: Arc<dyn OrchestrationService>,
        activity: Arc<dyn Activity>,
        task: ActivityTask,
    ) -> DispatchReport {
        let ctx = ActivityContext::new(Arc::clone(&service), &task);
        let started = Instant::now();

        let outcome = match task.input.as_deref().map(Payload::from_text).transpose() {
            Ok(input) => AssertUnwindSafe(activity.execute(&ctx, input))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    ActivityOutcome::failed(
                        reasons::ACTIVITY_PANICKED,
                        format!("{} panicked", activity.kind()),
                    )
                }),
            Err(err) => ActivityOutcome::failed(reasons::MALFORMED_INPUT, err.to_string()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (completed, status, details, response) = match outcome {
            ActivityOutcome::Completed(result) => {
                let response = match result.to_text() {
                    Ok(text) => service
                        .respond_activity_task_completed(task.task_token, Some(text))
                        .await,
                    Err(err) => {
                        service
                            .respond_activity_task_failed(
                                task.task_token,
                                reasons::MALFORMED_RESULT,
                                &err.to_string(),
                            )
                            .await
                    }
                };
                (true, "completed", None, response)
            }
            ActivityOutcome::Failed { reason, detail } => {
                let response = service
                    .respond_activity_task_failed(task.task_token, &reason, &detail)
                    .await;
                (false, "failed", Some(format!("{reason}: {detail}")), response)
            }
        };

        log_activity_dispatch(
            activity.kind().name(),
            &task.activity_id,
            &task.workflow_execution.workflow_id,
            status,
            Some(duration_ms),
            details.as_deref(),
        );
        let reported = match response {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    activity_id = %task.activity_id,
                    error = %err,
                    "Activity outcome rejected by the orchestration service"
                );
                false
            }
        };
        DispatchReport {
            completed,
            reported,
        }
    }
}
