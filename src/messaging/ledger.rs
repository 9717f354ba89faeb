//! # Execution Ledger
//!
//! Storage-independent bookkeeping shared by every orchestration backend.
//! A backend loads an [`ExecutionLedger`] (and any [`ActivityTaskRecord`]s),
//! calls one of the operations below, then persists the mutated records and
//! the history events the operation produced. Keeping the rules here means the
//! in-memory and PostgreSQL services number events, hand out decision tasks
//! and enforce timeouts identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};
use super::message::{ActivityTask, DecisionTask, StartExecutionRequest, TaskToken};
use crate::models::{
    ActivityDefinition, ActivityTimeouts, Decision, DefinitionKey, EventKind, ExecutionInfo,
    ExecutionStatus, FailureKind, HistoryEvent, TimeoutType, WorkflowDefinition,
    WorkflowExecution,
};

/// Cause recorded when a decision schedules an unregistered activity type
pub const ACTIVITY_TYPE_DOES_NOT_EXIST: &str = "ACTIVITY_TYPE_DOES_NOT_EXIST";

fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Decision task bookkeeping; at most one decision task is ever in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DecisionSlot {
    Idle,
    Scheduled {
        scheduled_event_id: i64,
    },
    Started {
        task_token: TaskToken,
        scheduled_event_id: i64,
        started_event_id: i64,
        started_at: DateTime<Utc>,
        /// New events arrived while the task was in flight
        pending: bool,
    },
}

impl DecisionSlot {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled { .. } => "scheduled",
            Self::Started { .. } => "started",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLedger {
    pub domain: String,
    pub execution: WorkflowExecution,
    pub workflow_type: DefinitionKey,
    pub task_list: String,
    pub status: ExecutionStatus,
    pub next_event_id: i64,
    pub previous_started_event_id: i64,
    pub decision: DecisionSlot,
    pub execution_timeout: Duration,
    pub decision_timeout: Duration,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ExecutionLedger {
    /// Open a new execution: records the start event and schedules the first decision
    pub fn start(
        domain: &str,
        definition: &WorkflowDefinition,
        request: StartExecutionRequest,
        now: DateTime<Utc>,
        events: &mut Vec<HistoryEvent>,
    ) -> Self {
        let task_list = request
            .task_list
            .unwrap_or_else(|| definition.options.default_task_list.clone());
        let options = &definition.options;

        let mut ledger = Self {
            domain: domain.to_string(),
            execution: WorkflowExecution {
                workflow_id: request.workflow_id,
                run_id: Uuid::new_v4(),
            },
            workflow_type: definition.key.clone(),
            task_list: task_list.clone(),
            status: ExecutionStatus::Open,
            next_event_id: 1,
            previous_started_event_id: 0,
            decision: DecisionSlot::Idle,
            execution_timeout: options.execution_start_to_close,
            decision_timeout: options.task_start_to_close,
            started_at: now,
            closed_at: None,
        };

        ledger.append(
            EventKind::WorkflowExecutionStarted {
                workflow_type: definition.key.clone(),
                input: request.input,
                task_list,
                child_policy: options.child_policy,
                execution_start_to_close_timeout_ms: options.execution_start_to_close.as_millis()
                    as u64,
                task_start_to_close_timeout_ms: options.task_start_to_close.as_millis() as u64,
            },
            now,
            events,
        );
        ledger
    }

    pub fn is_open(&self) -> bool {
        self.status == ExecutionStatus::Open
    }

    pub fn run_id(&self) -> Uuid {
        self.execution.run_id
    }

    /// A decision task is waiting to be picked up
    pub fn is_decision_ready(&self) -> bool {
        self.is_open() && matches!(self.decision, DecisionSlot::Scheduled { .. })
    }

    /// Record an event and schedule a decision if the event calls for one
    pub fn append(
        &mut self,
        kind: EventKind,
        now: DateTime<Utc>,
        events: &mut Vec<HistoryEvent>,
    ) -> i64 {
        let needs_decision = kind.requires_decision();
        let event_id = self.record(kind, now, events);
        if needs_decision {
            self.request_decision(now, events);
        }
        event_id
    }

    fn record(&mut self, kind: EventKind, now: DateTime<Utc>, events: &mut Vec<HistoryEvent>) -> i64 {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        events.push(HistoryEvent {
            event_id,
            event_timestamp: now,
            kind,
        });
        event_id
    }

    fn request_decision(&mut self, now: DateTime<Utc>, events: &mut Vec<HistoryEvent>) {
        if !self.is_open() {
            return;
        }
        match self.decision {
            DecisionSlot::Idle => {
                let scheduled_event_id = self.record(
                    EventKind::DecisionTaskScheduled {
                        task_list: self.task_list.clone(),
                    },
                    now,
                    events,
                );
                self.decision = DecisionSlot::Scheduled { scheduled_event_id };
            }
            DecisionSlot::Scheduled { .. } => {}
            DecisionSlot::Started {
                ref mut pending, ..
            } => *pending = true,
        }
    }

    /// Hand the scheduled decision task to a decider
    pub fn start_decision(
        &mut self,
        identity: &str,
        now: DateTime<Utc>,
        events: &mut Vec<HistoryEvent>,
    ) -> Option<(TaskToken, i64)> {
        if !self.is_open() {
            return None;
        }
        let DecisionSlot::Scheduled { scheduled_event_id } = self.decision else {
            return None;
        };

        let started_event_id = self.record(
            EventKind::DecisionTaskStarted {
                scheduled_event_id,
                identity: identity.to_string(),
            },
            now,
            events,
        );
        let task_token = TaskToken::generate();
        self.decision = DecisionSlot::Started {
            task_token,
            scheduled_event_id,
            started_event_id,
            started_at: now,
            pending: false,
        };
        Some((task_token, started_event_id))
    }

    pub fn decision_task(
        &self,
        task_token: TaskToken,
        started_event_id: i64,
        history: Vec<HistoryEvent>,
    ) -> DecisionTask {
        DecisionTask {
            task_token,
            workflow_execution: self.execution.clone(),
            workflow_type: self.workflow_type.clone(),
            events: history,
            previous_started_event_id: self.previous_started_event_id,
            started_event_id,
        }
    }

    /// Complete the in-flight decision task and apply its decisions in order.
    /// Returns the activity tasks the backend must enqueue.
    pub fn respond_decision(
        &mut self,
        task_token: TaskToken,
        decisions: Vec<Decision>,
        resolve_activity: impl Fn(&DefinitionKey) -> Option<ActivityDefinition>,
        now: DateTime<Utc>,
        events: &mut Vec<HistoryEvent>,
    ) -> MessagingResult<Vec<ActivityTaskRecord>> {
        let (scheduled_event_id, started_event_id, pending) = match &self.decision {
            DecisionSlot::Started {
                task_token: current,
                scheduled_event_id,
                started_event_id,
                pending,
                ..
            } if *current == task_token => (*scheduled_event_id, *started_event_id, *pending),
            _ if !self.is_open() => return Err(MessagingError::execution_closed(self.run_id())),
            _ => return Err(MessagingError::unknown_resource("decision task", task_token)),
        };

        let completed_event_id = self.record(
            EventKind::DecisionTaskCompleted {
                scheduled_event_id,
                started_event_id,
            },
            now,
            events,
        );
        self.previous_started_event_id = started_event_id;
        self.decision = DecisionSlot::Idle;

        let mut needs_decision = pending;
        let mut scheduled = Vec::new();

        for decision in decisions {
            if !self.is_open() {
                warn!(
                    run_id = %self.run_id(),
                    decision_type = decision.decision_type(),
                    "Decision after execution close ignored"
                );
                continue;
            }
            match decision {
                Decision::ScheduleActivityTask {
                    activity_type,
                    activity_id,
                    input,
                    task_list,
                    timeouts,
                } => match resolve_activity(&activity_type) {
                    Some(definition) => {
                        let task_list =
                            task_list.unwrap_or_else(|| definition.options.default_task_list.clone());
                        let timeouts = timeouts.unwrap_or(definition.options.timeouts);
                        let scheduled_event_id = self.record(
                            EventKind::ActivityTaskScheduled {
                                activity_type: activity_type.clone(),
                                activity_id: activity_id.clone(),
                                input: input.clone(),
                                task_list: task_list.clone(),
                                timeouts,
                                decision_task_completed_event_id: completed_event_id,
                            },
                            now,
                            events,
                        );
                        scheduled.push(ActivityTaskRecord {
                            task_token: TaskToken::generate(),
                            domain: self.domain.clone(),
                            task_list,
                            workflow_execution: self.execution.clone(),
                            activity_id,
                            activity_type,
                            input,
                            timeouts,
                            scheduled_event_id,
                            scheduled_at: now,
                            started: None,
                        });
                    }
                    None => {
                        self.record(
                            EventKind::ScheduleActivityTaskFailed {
                                activity_type,
                                activity_id,
                                cause: ACTIVITY_TYPE_DOES_NOT_EXIST.to_string(),
                                decision_task_completed_event_id: completed_event_id,
                            },
                            now,
                            events,
                        );
                        needs_decision = true;
                    }
                },
                Decision::CompleteWorkflowExecution { result } => {
                    self.record(
                        EventKind::WorkflowExecutionCompleted {
                            result,
                            decision_task_completed_event_id: completed_event_id,
                        },
                        now,
                        events,
                    );
                    self.close(ExecutionStatus::Completed, now);
                }
                Decision::FailWorkflowExecution {
                    reason,
                    details,
                    kind: FailureKind::ActivityFailed,
                } => {
                    self.record(
                        EventKind::WorkflowExecutionFailed {
                            reason,
                            details,
                            decision_task_completed_event_id: completed_event_id,
                        },
                        now,
                        events,
                    );
                    self.close(ExecutionStatus::Failed, now);
                }
                Decision::FailWorkflowExecution {
                    reason,
                    details,
                    kind: FailureKind::ActivityTimedOut,
                } => {
                    self.record(
                        EventKind::WorkflowExecutionTimedOut {
                            reason: format!("{reason}: {details}"),
                        },
                        now,
                        events,
                    );
                    self.close(ExecutionStatus::TimedOut, now);
                }
            }
        }

        if needs_decision {
            self.request_decision(now, events);
        }
        if !self.is_open() {
            scheduled.clear();
        }
        Ok(scheduled)
    }

    /// Enforce the execution and decision task timeouts
    pub fn check_timeouts(&mut self, now: DateTime<Utc>, events: &mut Vec<HistoryEvent>) -> bool {
        if !self.is_open() {
            return false;
        }

        if elapsed_since(self.started_at, now) >= self.execution_timeout {
            debug!(run_id = %self.run_id(), "Execution start-to-close timeout elapsed");
            self.record(
                EventKind::WorkflowExecutionTimedOut {
                    reason: "execution start-to-close timeout elapsed".to_string(),
                },
                now,
                events,
            );
            self.close(ExecutionStatus::TimedOut, now);
            return true;
        }

        if let DecisionSlot::Started {
            scheduled_event_id,
            started_event_id,
            started_at,
            ..
        } = self.decision
        {
            if elapsed_since(started_at, now) >= self.decision_timeout {
                debug!(run_id = %self.run_id(), "Decision task timed out, rescheduling");
                self.decision = DecisionSlot::Idle;
                self.append(
                    EventKind::DecisionTaskTimedOut {
                        scheduled_event_id,
                        started_event_id,
                    },
                    now,
                    events,
                );
                return true;
            }
        }
        false
    }

    fn close(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.closed_at = Some(now);
        self.decision = DecisionSlot::Idle;
    }

    pub fn info(&self, open_activity_tasks: usize) -> ExecutionInfo {
        ExecutionInfo {
            execution: self.execution.clone(),
            workflow_type: self.workflow_type.clone(),
            task_list: self.task_list.clone(),
            status: self.status,
            started_at: self.started_at,
            closed_at: self.closed_at,
            open_activity_tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedAttempt {
    pub started_event_id: i64,
    pub identity: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub heartbeat_details: Option<String>,
}

/// One scheduled activity task, from scheduling until its outcome is recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskRecord {
    pub task_token: TaskToken,
    pub domain: String,
    pub task_list: String,
    pub workflow_execution: WorkflowExecution,
    pub activity_id: String,
    pub activity_type: DefinitionKey,
    pub input: Option<String>,
    pub timeouts: ActivityTimeouts,
    pub scheduled_event_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub started: Option<StartedAttempt>,
}

impl ActivityTaskRecord {
    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn run_id(&self) -> Uuid {
        self.workflow_execution.run_id
    }

    /// The first timeout this task has exceeded, if any
    pub fn expired_timeout(&self, now: DateTime<Utc>) -> Option<TimeoutType> {
        if self
            .timeouts
            .schedule_to_close
            .is_exceeded_by(elapsed_since(self.scheduled_at, now))
        {
            return Some(TimeoutType::ScheduleToClose);
        }

        match &self.started {
            None => self
                .timeouts
                .schedule_to_start
                .is_exceeded_by(elapsed_since(self.scheduled_at, now))
                .then_some(TimeoutType::ScheduleToStart),
            Some(attempt) => {
                if self
                    .timeouts
                    .start_to_close
                    .is_exceeded_by(elapsed_since(attempt.started_at, now))
                {
                    Some(TimeoutType::StartToClose)
                } else if self
                    .timeouts
                    .heartbeat
                    .is_exceeded_by(elapsed_since(attempt.last_heartbeat_at, now))
                {
                    Some(TimeoutType::Heartbeat)
                } else {
                    None
                }
            }
        }
    }

    pub fn timed_out_event(&self, timeout_type: TimeoutType) -> EventKind {
        EventKind::ActivityTaskTimedOut {
            scheduled_event_id: self.scheduled_event_id,
            started_event_id: self.started.as_ref().map(|s| s.started_event_id),
            timeout_type,
            details: self
                .started
                .as_ref()
                .and_then(|s| s.heartbeat_details.clone()),
        }
    }

    /// Mark the task as picked up by a worker
    pub fn start(
        &mut self,
        ledger: &mut ExecutionLedger,
        identity: &str,
        now: DateTime<Utc>,
        events: &mut Vec<HistoryEvent>,
    ) -> ActivityTask {
        let started_event_id = ledger.append(
            EventKind::ActivityTaskStarted {
                scheduled_event_id: self.scheduled_event_id,
                identity: identity.to_string(),
            },
            now,
            events,
        );
        self.started = Some(StartedAttempt {
            started_event_id,
            identity: identity.to_string(),
            started_at: now,
            last_heartbeat_at: now,
            heartbeat_details: None,
        });

        ActivityTask {
            task_token: self.task_token,
            activity_id: self.activity_id.clone(),
            activity_type: self.activity_type.clone(),
            input: self.input.clone(),
            workflow_execution: self.workflow_execution.clone(),
            started_event_id,
            heartbeat_timeout: self.timeouts.heartbeat.duration(),
        }
    }

    /// Record a heartbeat; only started tasks can heartbeat
    pub fn heartbeat(&mut self, details: Option<String>, now: DateTime<Utc>) -> MessagingResult<()> {
        let attempt = self
            .started
            .as_mut()
            .ok_or_else(|| MessagingError::unknown_resource("activity task", self.task_token))?;
        attempt.last_heartbeat_at = now;
        if details.is_some() {
            attempt.heartbeat_details = details;
        }
        Ok(())
    }

    pub fn completed_event(&self, result: Option<String>) -> MessagingResult<EventKind> {
        Ok(EventKind::ActivityTaskCompleted {
            scheduled_event_id: self.scheduled_event_id,
            started_event_id: self.started_event_id()?,
            result,
        })
    }

    pub fn failed_event(&self, reason: &str, details: &str) -> MessagingResult<EventKind> {
        Ok(EventKind::ActivityTaskFailed {
            scheduled_event_id: self.scheduled_event_id,
            started_event_id: self.started_event_id()?,
            reason: reason.to_string(),
            details: details.to_string(),
        })
    }

    fn started_event_id(&self) -> MessagingResult<i64> {
        self.started
            .as_ref()
            .map(|s| s.started_event_id)
            .ok_or_else(|| MessagingError::unknown_resource("activity task", self.task_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityOptions, ChildPolicy, Timeout, WorkflowOptions};
    use chrono::Duration as ChronoDuration;

    fn workflow_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            key: DefinitionKey::new("subscription_workflow", "1"),
            options: WorkflowOptions {
                child_policy: ChildPolicy::Terminate,
                execution_start_to_close: Duration::from_secs(60),
                task_start_to_close: Duration::from_secs(5),
                default_task_list: "registration".to_string(),
                description: None,
            },
        }
    }

    fn activity_definition() -> ActivityDefinition {
        ActivityDefinition {
            key: DefinitionKey::new("get_contact_activity", "1"),
            options: ActivityOptions {
                timeouts: ActivityTimeouts {
                    schedule_to_start: Timeout::After(Duration::from_secs(10)),
                    start_to_close: Timeout::After(Duration::from_secs(30)),
                    schedule_to_close: Timeout::After(Duration::from_secs(40)),
                    heartbeat: Timeout::After(Duration::from_secs(5)),
                },
                default_task_list: "registration-activities".to_string(),
                description: None,
            },
        }
    }

    fn start() -> (ExecutionLedger, Vec<HistoryEvent>, DateTime<Utc>) {
        let now = Utc::now();
        let mut events = Vec::new();
        let ledger = ExecutionLedger::start(
            "test-domain",
            &workflow_definition(),
            StartExecutionRequest {
                workflow_id: "wf-1".to_string(),
                workflow_type: DefinitionKey::new("subscription_workflow", "1"),
                input: None,
                task_list: None,
            },
            now,
            &mut events,
        );
        (ledger, events, now)
    }

    fn schedule_one(
        ledger: &mut ExecutionLedger,
        events: &mut Vec<HistoryEvent>,
        now: DateTime<Utc>,
    ) -> ActivityTaskRecord {
        let (token, _) = ledger.start_decision("decider", now, events).unwrap();
        let mut records = ledger
            .respond_decision(
                token,
                vec![Decision::ScheduleActivityTask {
                    activity_type: DefinitionKey::new("get_contact_activity", "1"),
                    activity_id: "0.0".to_string(),
                    input: None,
                    task_list: None,
                    timeouts: None,
                }],
                |_| Some(activity_definition()),
                now,
                events,
            )
            .unwrap();
        records.remove(0)
    }

    #[test]
    fn test_start_records_execution_and_first_decision() {
        let (ledger, events, _) = start();
        let types: Vec<&str> = events.iter().map(HistoryEvent::event_type).collect();
        assert_eq!(
            types,
            vec!["WorkflowExecutionStarted", "DecisionTaskScheduled"]
        );
        assert!(ledger.is_decision_ready());
        assert_eq!(ledger.next_event_id, 3);
    }

    #[test]
    fn test_only_one_decision_task_in_flight() {
        let (mut ledger, mut events, now) = start();
        let (token, started) = ledger.start_decision("decider", now, &mut events).unwrap();
        assert_eq!(started, 3);
        assert!(ledger.start_decision("other", now, &mut events).is_none());

        ledger.append(
            EventKind::ActivityTaskFailed {
                scheduled_event_id: 1,
                started_event_id: 2,
                reason: "r".to_string(),
                details: "d".to_string(),
            },
            now,
            &mut events,
        );
        assert!(!ledger.is_decision_ready());

        ledger
            .respond_decision(token, Vec::new(), |_| None, now, &mut events)
            .unwrap();
        assert!(ledger.is_decision_ready(), "pending events reschedule a decision");
        assert_eq!(ledger.previous_started_event_id, 3);
    }

    #[test]
    fn test_stale_decision_token_is_rejected() {
        let (mut ledger, mut events, now) = start();
        ledger.start_decision("decider", now, &mut events).unwrap();
        let result =
            ledger.respond_decision(TaskToken::generate(), Vec::new(), |_| None, now, &mut events);
        assert!(matches!(result, Err(MessagingError::UnknownResource { .. })));
    }

    #[test]
    fn test_unknown_activity_type_records_schedule_failure() {
        let (mut ledger, mut events, now) = start();
        let (token, _) = ledger.start_decision("decider", now, &mut events).unwrap();
        let records = ledger
            .respond_decision(
                token,
                vec![Decision::ScheduleActivityTask {
                    activity_type: DefinitionKey::new("missing", "1"),
                    activity_id: "0.0".to_string(),
                    input: None,
                    task_list: None,
                    timeouts: None,
                }],
                |_| None,
                now,
                &mut events,
            )
            .unwrap();

        assert!(records.is_empty());
        assert!(events
            .iter()
            .any(|e| e.event_type() == "ScheduleActivityTaskFailed"));
        assert!(ledger.is_decision_ready());
    }

    #[test]
    fn test_complete_closes_and_drops_later_decisions() {
        let (mut ledger, mut events, now) = start();
        let (token, _) = ledger.start_decision("decider", now, &mut events).unwrap();
        let records = ledger
            .respond_decision(
                token,
                vec![
                    Decision::CompleteWorkflowExecution { result: None },
                    Decision::ScheduleActivityTask {
                        activity_type: DefinitionKey::new("get_contact_activity", "1"),
                        activity_id: "0.0".to_string(),
                        input: None,
                        task_list: None,
                        timeouts: None,
                    },
                ],
                |_| Some(activity_definition()),
                now,
                &mut events,
            )
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(ledger.status, ExecutionStatus::Completed);
        assert!(ledger.closed_at.is_some());
    }

    #[test]
    fn test_timed_out_failure_closes_as_timed_out() {
        let (mut ledger, mut events, now) = start();
        let (token, _) = ledger.start_decision("decider", now, &mut events).unwrap();
        ledger
            .respond_decision(
                token,
                vec![Decision::FailWorkflowExecution {
                    reason: "activity timed out".to_string(),
                    details: "wait_for_confirmation_activity".to_string(),
                    kind: FailureKind::ActivityTimedOut,
                }],
                |_| None,
                now,
                &mut events,
            )
            .unwrap();
        assert_eq!(ledger.status, ExecutionStatus::TimedOut);
    }

    #[test]
    fn test_decision_timeout_reschedules() {
        let (mut ledger, mut events, now) = start();
        ledger.start_decision("decider", now, &mut events).unwrap();

        assert!(!ledger.check_timeouts(now + ChronoDuration::seconds(1), &mut events));
        assert!(ledger.check_timeouts(now + ChronoDuration::seconds(6), &mut events));
        assert!(ledger.is_decision_ready());
        assert!(events.iter().any(|e| e.event_type() == "DecisionTaskTimedOut"));
    }

    #[test]
    fn test_execution_timeout_closes() {
        let (mut ledger, mut events, now) = start();
        assert!(ledger.check_timeouts(now + ChronoDuration::seconds(61), &mut events));
        assert_eq!(ledger.status, ExecutionStatus::TimedOut);
        assert!(!ledger.is_decision_ready());
    }

    #[test]
    fn test_activity_timeouts_in_order() {
        let (mut ledger, mut events, now) = start();
        let mut record = schedule_one(&mut ledger, &mut events, now);

        assert_eq!(record.expired_timeout(now), None);
        assert_eq!(
            record.expired_timeout(now + ChronoDuration::seconds(11)),
            Some(TimeoutType::ScheduleToStart)
        );

        let started_at = now + ChronoDuration::seconds(1);
        record.start(&mut ledger, "worker", started_at, &mut events);
        assert_eq!(
            record.expired_timeout(started_at + ChronoDuration::seconds(6)),
            Some(TimeoutType::Heartbeat)
        );

        record
            .heartbeat(
                Some("0 confirmed, 1 pending".to_string()),
                started_at + ChronoDuration::seconds(4),
            )
            .unwrap();
        assert_eq!(
            record.expired_timeout(started_at + ChronoDuration::seconds(6)),
            None
        );
        assert_eq!(
            record.expired_timeout(now + ChronoDuration::seconds(41)),
            Some(TimeoutType::ScheduleToClose)
        );

        match record.timed_out_event(TimeoutType::Heartbeat) {
            EventKind::ActivityTaskTimedOut { details, .. } => {
                assert_eq!(details.as_deref(), Some("0 confirmed, 1 pending"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
