//! A registration system on the in-memory backends with its worker and
//! coordinator running as background tasks.

use registration_workflow::bootstrap::RegistrationSystem;
use registration_workflow::config::WorkflowConfig;
use registration_workflow::interfaces::{
    InMemoryNotificationService, Protocol, ScriptedUserInput, UserInput,
};
use registration_workflow::messaging::{InMemoryOrchestrationService, InMemoryServiceConfig};
use registration_workflow::models::{ExecutionInfo, HistoryEvent, WorkflowExecution};
use registration_workflow::orchestration::CoordinatorStats;
use registration_workflow::worker::WorkerStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn memory_service(config: &WorkflowConfig) -> Arc<InMemoryOrchestrationService> {
    Arc::new(InMemoryOrchestrationService::new(InMemoryServiceConfig {
        poll_timeout: Duration::from_millis(config.orchestrator.poll_timeout_ms),
        timer_resolution: Duration::from_millis(config.orchestrator.timer_resolution_ms),
    }))
}

/// Answers for the email and phone prompts
pub fn contact_answers(email: &str, phone: &str) -> Arc<ScriptedUserInput> {
    Arc::new(ScriptedUserInput::new([email, phone]))
}

pub struct Harness {
    pub config: WorkflowConfig,
    pub service: Arc<InMemoryOrchestrationService>,
    pub notifications: Arc<InMemoryNotificationService>,
    pub system: RegistrationSystem,
    worker: Option<(CancellationToken, JoinHandle<WorkerStats>)>,
    coordinator: Option<(CancellationToken, JoinHandle<CoordinatorStats>)>,
}

impl Harness {
    pub async fn new(config: WorkflowConfig, user_input: Arc<dyn UserInput>) -> Self {
        let service = memory_service(&config);
        let notifications = Arc::new(InMemoryNotificationService::new());
        Self::with_backends(config, service, notifications, user_input).await
    }

    pub async fn with_backends(
        config: WorkflowConfig,
        service: Arc<InMemoryOrchestrationService>,
        notifications: Arc<InMemoryNotificationService>,
        user_input: Arc<dyn UserInput>,
    ) -> Self {
        let system = RegistrationSystem::bootstrap(
            config.clone(),
            service.clone(),
            notifications.clone(),
            user_input,
        )
        .await
        .expect("bootstrap");
        Self {
            config,
            service,
            notifications,
            system,
            worker: None,
            coordinator: None,
        }
    }

    pub fn spawn_worker(&mut self) {
        let worker = self.system.activity_worker().expect("worker");
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { worker.run(token).await });
        self.worker = Some((shutdown, handle));
    }

    pub fn spawn_coordinator(&mut self) {
        let coordinator = self.system.coordinator();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { coordinator.run(token).await });
        self.coordinator = Some((shutdown, handle));
    }

    pub fn spawn_all(&mut self) {
        self.spawn_worker();
        self.spawn_coordinator();
    }

    pub async fn stop_coordinator(&mut self) -> CoordinatorStats {
        match self.coordinator.take() {
            Some((shutdown, handle)) => {
                shutdown.cancel();
                handle.await.expect("coordinator task")
            }
            None => CoordinatorStats::default(),
        }
    }

    pub async fn stop_worker(&mut self) -> WorkerStats {
        match self.worker.take() {
            Some((shutdown, handle)) => {
                shutdown.cancel();
                handle.await.expect("worker task")
            }
            None => WorkerStats::default(),
        }
    }

    pub async fn shutdown(mut self) -> (WorkerStats, CoordinatorStats) {
        let worker = self.stop_worker().await;
        let coordinator = self.stop_coordinator().await;
        (worker, coordinator)
    }

    pub async fn start(&self, workflow_id: &str) -> WorkflowExecution {
        self.system
            .start_execution(workflow_id, None)
            .await
            .expect("start execution")
    }

    pub async fn wait_for_close(&self, execution: &WorkflowExecution) -> ExecutionInfo {
        self.system
            .wait_for_close(
                execution.run_id,
                Duration::from_millis(20),
                Duration::from_secs(10),
            )
            .await
            .expect("execution should close")
    }

    pub async fn history(&self, execution: &WorkflowExecution) -> Vec<HistoryEvent> {
        self.system
            .history(execution.run_id)
            .await
            .expect("history")
    }

    pub fn topic_ref(&self, workflow_id: &str) -> String {
        InMemoryNotificationService::topic_ref(&format!(
            "{}-{}",
            self.config.notification.topic_prefix, workflow_id
        ))
    }

    /// Wait until the topic exists, then confirm one protocol
    pub async fn confirm_when_subscribed(&self, workflow_id: &str, protocol: Protocol) {
        let topic_ref = self.topic_ref(workflow_id);
        for _ in 0..500 {
            if self.notifications.confirm(&topic_ref, protocol) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {protocol} subscription appeared on {topic_ref}");
    }
}

/// Event type names in order
pub fn event_types(history: &[HistoryEvent]) -> Vec<&'static str> {
    history.iter().map(HistoryEvent::event_type).collect()
}

pub fn count_events(history: &[HistoryEvent], event_type: &str) -> usize {
    history
        .iter()
        .filter(|e| e.event_type() == event_type)
        .count()
}
