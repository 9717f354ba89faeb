//! # In-Memory Orchestration Service
//!
//! A single-process backend for demos and tests. All state lives behind one
//! `parking_lot::Mutex`; long-polls wait on `tokio::sync::Notify` and wake at
//! least every `timer_resolution` so timeouts are enforced even when nothing
//! else happens.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};
use super::ledger::{ActivityTaskRecord, DecisionSlot, ExecutionLedger};
use super::message::{
    ActivityTask, DecisionTask, DomainRegistration, HeartbeatStatus, StartExecutionRequest,
    TaskToken,
};
use super::service::OrchestrationService;
use crate::models::{
    ActivityDefinition, Decision, DefinitionKind, EventKind, ExecutionInfo, HistoryEvent,
    RegisteredDefinition, TimeoutType, WorkflowDefinition, WorkflowExecution,
};

#[derive(Debug, Clone)]
pub struct InMemoryServiceConfig {
    /// How long a poll waits for work before returning `None`
    pub poll_timeout: Duration,
    /// Upper bound on how late a timeout may be detected
    pub timer_resolution: Duration,
}

impl Default for InMemoryServiceConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(60),
            timer_resolution: Duration::from_millis(50),
        }
    }
}

struct ExecutionEntry {
    ledger: ExecutionLedger,
    history: Vec<HistoryEvent>,
}

type QueueKey = (String, String);

#[derive(Default)]
struct ServiceState {
    domains: HashMap<String, DomainRegistration>,
    definitions: HashMap<String, Vec<RegisteredDefinition>>,
    executions: HashMap<Uuid, ExecutionEntry>,
    decision_queues: HashMap<QueueKey, VecDeque<Uuid>>,
    activity_queues: HashMap<QueueKey, VecDeque<TaskToken>>,
    activity_tasks: HashMap<TaskToken, ActivityTaskRecord>,
}

#[derive(Default)]
struct Wakeups {
    decisions: bool,
    activities: bool,
}

impl ServiceState {
    fn require_domain(&self, domain: &str) -> MessagingResult<()> {
        if self.domains.contains_key(domain) {
            Ok(())
        } else {
            Err(MessagingError::domain_does_not_exist(domain))
        }
    }

    fn register_definition(
        &mut self,
        domain: &str,
        definition: RegisteredDefinition,
    ) -> MessagingResult<()> {
        self.require_domain(domain)?;
        let definitions = self.definitions.entry(domain.to_string()).or_default();
        let exists = definitions
            .iter()
            .any(|d| d.kind() == definition.kind() && d.key() == definition.key());
        if exists {
            let key = definition.key();
            return Err(MessagingError::type_already_exists(
                definition.kind(),
                key.name.clone(),
                key.version.clone(),
            ));
        }
        definitions.push(definition);
        Ok(())
    }

    fn enqueue_decision_if_ready(&mut self, run_id: Uuid, wakeups: &mut Wakeups) {
        let Some(entry) = self.executions.get(&run_id) else {
            return;
        };
        if !entry.ledger.is_decision_ready() {
            return;
        }
        let key = (entry.ledger.domain.clone(), entry.ledger.task_list.clone());
        let queue = self.decision_queues.entry(key).or_default();
        if !queue.contains(&run_id) {
            queue.push_back(run_id);
            wakeups.decisions = true;
        }
    }

    fn enqueue_activities(&mut self, records: Vec<ActivityTaskRecord>, wakeups: &mut Wakeups) {
        for record in records {
            let key = (record.domain.clone(), record.task_list.clone());
            self.activity_queues
                .entry(key)
                .or_default()
                .push_back(record.task_token);
            self.activity_tasks.insert(record.task_token, record);
            wakeups.activities = true;
        }
    }

    /// Record an activity outcome event and retire the task
    fn resolve_activity(
        &mut self,
        task_token: TaskToken,
        outcome: impl FnOnce(&ActivityTaskRecord) -> MessagingResult<EventKind>,
        wakeups: &mut Wakeups,
    ) -> MessagingResult<()> {
        let record = self
            .activity_tasks
            .get(&task_token)
            .ok_or_else(|| MessagingError::unknown_resource("activity task", task_token))?;
        let run_id = record.run_id();
        let entry = self
            .executions
            .get_mut(&run_id)
            .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))?;

        if !entry.ledger.is_open() {
            self.activity_tasks.remove(&task_token);
            return Err(MessagingError::execution_closed(run_id));
        }

        let kind = outcome(record)?;
        let mut events = Vec::new();
        entry.ledger.append(kind, Utc::now(), &mut events);
        entry.history.extend(events);

        self.activity_tasks.remove(&task_token);
        self.enqueue_decision_if_ready(run_id, wakeups);
        Ok(())
    }

    /// Enforce activity, decision and execution timeouts
    fn sweep(&mut self, wakeups: &mut Wakeups) {
        let now = Utc::now();

        let run_ids: Vec<Uuid> = self.executions.keys().copied().collect();
        for run_id in run_ids {
            if let Some(entry) = self.executions.get_mut(&run_id) {
                let mut events = Vec::new();
                if entry.ledger.check_timeouts(now, &mut events) {
                    entry.history.extend(events);
                    self.enqueue_decision_if_ready(run_id, wakeups);
                }
            }
        }

        let expired: Vec<(TaskToken, Option<TimeoutType>)> = self
            .activity_tasks
            .values()
            .filter_map(|record| {
                let open = self
                    .executions
                    .get(&record.run_id())
                    .is_some_and(|entry| entry.ledger.is_open());
                if !open {
                    return Some((record.task_token, None));
                }
                record
                    .expired_timeout(now)
                    .map(|timeout_type| (record.task_token, Some(timeout_type)))
            })
            .collect();

        for (task_token, timeout_type) in expired {
            let Some(record) = self.activity_tasks.remove(&task_token) else {
                continue;
            };
            let Some(timeout_type) = timeout_type else {
                debug!(task_token = %task_token, "Dropping activity task of a closed execution");
                continue;
            };
            let run_id = record.run_id();
            if let Some(entry) = self.executions.get_mut(&run_id) {
                debug!(
                    run_id = %run_id,
                    activity_id = %record.activity_id,
                    timeout_type = %timeout_type,
                    "Activity task timed out"
                );
                let mut events = Vec::new();
                entry
                    .ledger
                    .append(record.timed_out_event(timeout_type), now, &mut events);
                entry.history.extend(events);
                self.enqueue_decision_if_ready(run_id, wakeups);
            }
        }
    }

    fn take_decision(&mut self, domain: &str, task_list: &str, identity: &str) -> Option<DecisionTask> {
        let key = (domain.to_string(), task_list.to_string());
        loop {
            let run_id = self.decision_queues.get_mut(&key)?.pop_front()?;
            let Some(entry) = self.executions.get_mut(&run_id) else {
                continue;
            };
            let mut events = Vec::new();
            let Some((task_token, started_event_id)) =
                entry.ledger.start_decision(identity, Utc::now(), &mut events)
            else {
                continue;
            };
            entry.history.extend(events);
            return Some(
                entry
                    .ledger
                    .decision_task(task_token, started_event_id, entry.history.clone()),
            );
        }
    }

    fn take_activity(&mut self, domain: &str, task_list: &str, identity: &str) -> Option<ActivityTask> {
        let key = (domain.to_string(), task_list.to_string());
        loop {
            let task_token = self.activity_queues.get_mut(&key)?.pop_front()?;
            let Some(record) = self.activity_tasks.get_mut(&task_token) else {
                continue;
            };
            if record.is_started() {
                continue;
            }
            let Some(entry) = self.executions.get_mut(&record.run_id()) else {
                continue;
            };
            if !entry.ledger.is_open() {
                continue;
            }
            let mut events = Vec::new();
            let task = record.start(&mut entry.ledger, identity, Utc::now(), &mut events);
            entry.history.extend(events);
            return Some(task);
        }
    }
}

pub struct InMemoryOrchestrationService {
    state: Mutex<ServiceState>,
    decision_ready: Notify,
    activity_ready: Notify,
    config: InMemoryServiceConfig,
}

impl InMemoryOrchestrationService {
    pub fn new(config: InMemoryServiceConfig) -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            decision_ready: Notify::new(),
            activity_ready: Notify::new(),
            config,
        }
    }

    fn mutate<T>(&self, operation: impl FnOnce(&mut ServiceState, &mut Wakeups) -> T) -> T {
        let mut wakeups = Wakeups::default();
        let result = {
            let mut state = self.state.lock();
            operation(&mut state, &mut wakeups)
        };
        if wakeups.decisions {
            self.decision_ready.notify_waiters();
        }
        if wakeups.activities {
            self.activity_ready.notify_waiters();
        }
        result
    }

    /// Apply any timeouts that have elapsed
    pub fn enforce_timeouts(&self) {
        self.mutate(|state, wakeups| state.sweep(wakeups));
    }

    /// Number of activity tasks scheduled or running for an execution
    pub fn open_activity_tasks(&self, run_id: Uuid) -> usize {
        self.state
            .lock()
            .activity_tasks
            .values()
            .filter(|record| record.run_id() == run_id)
            .count()
    }

    async fn long_poll<T>(
        &self,
        notify: &Notify,
        mut take: impl FnMut(&mut ServiceState) -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + self.config.poll_timeout;
        loop {
            let notified = notify.notified();
            let taken = self.mutate(|state, wakeups| {
                state.sweep(wakeups);
                take(state)
            });
            if taken.is_some() {
                return taken;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait = (deadline - now).min(self.config.timer_resolution);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }
}

impl Default for InMemoryOrchestrationService {
    fn default() -> Self {
        Self::new(InMemoryServiceConfig::default())
    }
}

#[async_trait]
impl OrchestrationService for InMemoryOrchestrationService {
    async fn register_domain(&self, domain: &DomainRegistration) -> MessagingResult<()> {
        self.mutate(|state, _| {
            state
                .domains
                .entry(domain.name.clone())
                .or_insert_with(|| domain.clone());
        });
        Ok(())
    }

    async fn register_activity_definition(
        &self,
        domain: &str,
        definition: &ActivityDefinition,
    ) -> MessagingResult<()> {
        self.mutate(|state, _| {
            state.register_definition(domain, RegisteredDefinition::Activity(definition.clone()))
        })
    }

    async fn register_workflow_definition(
        &self,
        domain: &str,
        definition: &WorkflowDefinition,
    ) -> MessagingResult<()> {
        self.mutate(|state, _| {
            state.register_definition(domain, RegisteredDefinition::Workflow(definition.clone()))
        })
    }

    async fn list_definitions(&self, domain: &str) -> MessagingResult<Vec<RegisteredDefinition>> {
        let state = self.state.lock();
        state.require_domain(domain)?;
        Ok(state.definitions.get(domain).cloned().unwrap_or_default())
    }

    #[instrument(skip(self, request), fields(workflow_id = %request.workflow_id))]
    async fn start_workflow_execution(
        &self,
        domain: &str,
        request: StartExecutionRequest,
    ) -> MessagingResult<WorkflowExecution> {
        self.mutate(|state, wakeups| {
            state.require_domain(domain)?;
            let definition = state
                .definitions
                .get(domain)
                .and_then(|definitions| {
                    definitions
                        .iter()
                        .filter_map(RegisteredDefinition::as_workflow)
                        .find(|d| d.key == request.workflow_type)
                        .cloned()
                })
                .ok_or_else(|| {
                    MessagingError::type_does_not_exist(
                        DefinitionKind::Workflow,
                        request.workflow_type.name.clone(),
                        request.workflow_type.version.clone(),
                    )
                })?;

            let already_open = state.executions.values().any(|entry| {
                entry.ledger.domain == domain
                    && entry.ledger.is_open()
                    && entry.ledger.execution.workflow_id == request.workflow_id
            });
            if already_open {
                return Err(MessagingError::ExecutionAlreadyStarted {
                    workflow_id: request.workflow_id.clone(),
                });
            }

            let mut events = Vec::new();
            let ledger = ExecutionLedger::start(domain, &definition, request, Utc::now(), &mut events);
            let execution = ledger.execution.clone();
            state.executions.insert(
                execution.run_id,
                ExecutionEntry {
                    ledger,
                    history: events,
                },
            );
            state.enqueue_decision_if_ready(execution.run_id, wakeups);
            debug!(run_id = %execution.run_id, "Workflow execution started");
            Ok(execution)
        })
    }

    async fn describe_workflow_execution(&self, run_id: Uuid) -> MessagingResult<ExecutionInfo> {
        self.enforce_timeouts();
        let state = self.state.lock();
        let entry = state
            .executions
            .get(&run_id)
            .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))?;
        let open_tasks = state
            .activity_tasks
            .values()
            .filter(|record| record.run_id() == run_id)
            .count();
        Ok(entry.ledger.info(open_tasks))
    }

    async fn get_workflow_execution_history(
        &self,
        run_id: Uuid,
    ) -> MessagingResult<Vec<HistoryEvent>> {
        let state = self.state.lock();
        state
            .executions
            .get(&run_id)
            .map(|entry| entry.history.clone())
            .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))
    }

    async fn poll_for_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<DecisionTask>> {
        Ok(self
            .long_poll(&self.decision_ready, |state| {
                state.take_decision(domain, task_list, identity)
            })
            .await)
    }

    async fn respond_decision_task_completed(
        &self,
        task_token: TaskToken,
        decisions: Vec<Decision>,
    ) -> MessagingResult<()> {
        self.mutate(|state, wakeups| {
            state.sweep(wakeups);

            let run_id = state
                .executions
                .iter()
                .find(|(_, entry)| {
                    matches!(
                        &entry.ledger.decision,
                        DecisionSlot::Started { task_token: current, .. }
                            if *current == task_token
                    )
                })
                .map(|(run_id, _)| *run_id)
                .ok_or_else(|| MessagingError::unknown_resource("decision task", task_token))?;

            let domain = state.executions[&run_id].ledger.domain.clone();
            let activities: HashMap<_, _> = state
                .definitions
                .get(&domain)
                .map(|definitions| {
                    definitions
                        .iter()
                        .filter_map(RegisteredDefinition::as_activity)
                        .map(|d| (d.key.clone(), d.clone()))
                        .collect()
                })
                .unwrap_or_default();

            let entry = state
                .executions
                .get_mut(&run_id)
                .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))?;
            let mut events = Vec::new();
            let scheduled = entry.ledger.respond_decision(
                task_token,
                decisions,
                |key| activities.get(key).cloned(),
                Utc::now(),
                &mut events,
            )?;
            entry.history.extend(events);

            state.enqueue_activities(scheduled, wakeups);
            state.enqueue_decision_if_ready(run_id, wakeups);
            Ok(())
        })
    }

    async fn poll_for_activity_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<ActivityTask>> {
        Ok(self
            .long_poll(&self.activity_ready, |state| {
                state.take_activity(domain, task_list, identity)
            })
            .await)
    }

    async fn respond_activity_task_completed(
        &self,
        task_token: TaskToken,
        result: Option<String>,
    ) -> MessagingResult<()> {
        self.mutate(|state, wakeups| {
            state.sweep(wakeups);
            state.resolve_activity(task_token, |record| record.completed_event(result), wakeups)
        })
    }

    async fn respond_activity_task_failed(
        &self,
        task_token: TaskToken,
        reason: &str,
        details: &str,
    ) -> MessagingResult<()> {
        self.mutate(|state, wakeups| {
            state.sweep(wakeups);
            state.resolve_activity(
                task_token,
                |record| record.failed_event(reason, details),
                wakeups,
            )
        })
    }

    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
        details: Option<String>,
    ) -> MessagingResult<HeartbeatStatus> {
        self.mutate(|state, wakeups| {
            state.sweep(wakeups);
            let record = state.activity_tasks.get_mut(&task_token).ok_or_else(|| {
                warn!(task_token = %task_token, "Heartbeat for an unknown activity task");
                MessagingError::unknown_resource("activity task", task_token)
            })?;
            record.heartbeat(details, Utc::now())?;
            Ok(HeartbeatStatus::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityOptions, ActivityTimeouts, ChildPolicy, DefinitionKey, Timeout, WorkflowOptions,
    };

    const DOMAIN: &str = "test-domain";

    async fn service_with_workflow() -> (
        InMemoryOrchestrationService,
        DefinitionKey,
        DefinitionKey,
    ) {
        let service = InMemoryOrchestrationService::new(InMemoryServiceConfig {
            poll_timeout: Duration::from_millis(50),
            timer_resolution: Duration::from_millis(10),
        });
        service
            .register_domain(&DomainRegistration {
                name: DOMAIN.to_string(),
                description: None,
                retention_days: 1,
            })
            .await
            .unwrap();

        let workflow = WorkflowDefinition {
            key: DefinitionKey::new("subscription_workflow", "1"),
            options: WorkflowOptions {
                child_policy: ChildPolicy::Terminate,
                execution_start_to_close: Duration::from_secs(60),
                task_start_to_close: Duration::from_secs(5),
                default_task_list: "registration".to_string(),
                description: None,
            },
        };
        let activity = ActivityDefinition {
            key: DefinitionKey::new("get_contact_activity", "1"),
            options: ActivityOptions {
                timeouts: ActivityTimeouts {
                    heartbeat: Timeout::After(Duration::from_millis(40)),
                    ..ActivityTimeouts::default()
                },
                default_task_list: "registration-activities".to_string(),
                description: None,
            },
        };
        service
            .register_workflow_definition(DOMAIN, &workflow)
            .await
            .unwrap();
        service
            .register_activity_definition(DOMAIN, &activity)
            .await
            .unwrap();
        (service, workflow.key, activity.key)
    }

    async fn start(
        service: &InMemoryOrchestrationService,
        workflow_type: &DefinitionKey,
    ) -> WorkflowExecution {
        service
            .start_workflow_execution(
                DOMAIN,
                StartExecutionRequest {
                    workflow_id: "wf-1".to_string(),
                    workflow_type: workflow_type.clone(),
                    input: None,
                    task_list: None,
                },
            )
            .await
            .unwrap()
    }

    async fn schedule_one(
        service: &InMemoryOrchestrationService,
        activity_type: &DefinitionKey,
    ) -> ActivityTask {
        let decision = service
            .poll_for_decision_task(DOMAIN, "registration", "decider")
            .await
            .unwrap()
            .expect("decision task");
        service
            .respond_decision_task_completed(
                decision.task_token,
                vec![Decision::ScheduleActivityTask {
                    activity_type: activity_type.clone(),
                    activity_id: "0.0".to_string(),
                    input: None,
                    task_list: None,
                    timeouts: None,
                }],
            )
            .await
            .unwrap();
        service
            .poll_for_activity_task(DOMAIN, "registration-activities", "worker")
            .await
            .unwrap()
            .expect("activity task")
    }

    #[tokio::test]
    async fn test_empty_poll_returns_none_after_timeout() {
        let (service, _, _) = service_with_workflow().await;
        let polled = service
            .poll_for_activity_task(DOMAIN, "registration-activities", "worker")
            .await
            .unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_start_enqueues_one_decision_task() {
        let (service, workflow_type, _) = service_with_workflow().await;
        let execution = start(&service, &workflow_type).await;

        let task = service
            .poll_for_decision_task(DOMAIN, "registration", "decider")
            .await
            .unwrap()
            .expect("decision task");
        assert_eq!(task.workflow_execution, execution);
        assert_eq!(task.previous_started_event_id, 0);
        assert_eq!(task.events.len(), 3);

        // A second poller gets nothing while the first task is in flight
        let second = service
            .poll_for_decision_task(DOMAIN, "registration", "decider-2")
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_completion_retires_the_token() {
        let (service, workflow_type, activity_type) = service_with_workflow().await;
        let execution = start(&service, &workflow_type).await;
        let task = schedule_one(&service, &activity_type).await;

        service
            .respond_activity_task_completed(task.task_token, Some("{}".to_string()))
            .await
            .unwrap();
        let again = service
            .respond_activity_task_completed(task.task_token, Some("{}".to_string()))
            .await;
        assert!(matches!(again, Err(MessagingError::UnknownResource { .. })));
        assert_eq!(service.open_activity_tasks(execution.run_id), 0);
    }

    #[tokio::test]
    async fn test_missed_heartbeat_times_the_task_out() {
        let (service, workflow_type, activity_type) = service_with_workflow().await;
        let execution = start(&service, &workflow_type).await;
        let task = schedule_one(&service, &activity_type).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        service.enforce_timeouts();

        let heartbeat = service
            .record_activity_heartbeat(task.task_token, Some("late".to_string()))
            .await;
        assert!(heartbeat.is_err());
        let history = service
            .get_workflow_execution_history(execution.run_id)
            .await
            .unwrap();
        assert!(history.iter().any(|event| matches!(
            event.kind,
            EventKind::ActivityTaskTimedOut {
                timeout_type: TimeoutType::Heartbeat,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_unknown_domain_is_rejected() {
        let service = InMemoryOrchestrationService::default();
        let result = service.list_definitions("missing").await;
        assert!(matches!(result, Err(MessagingError::DomainDoesNotExist { .. })));
    }
}
