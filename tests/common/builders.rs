//! Builders for hand-written execution histories and decision tasks.

use registration_workflow::messaging::{DecisionTask, TaskToken};
use registration_workflow::models::{
    ActivityId, ActivityTimeouts, ChildPolicy, Combinator, DefinitionKey, EventKind,
    HistoryEvent, Payload, Pipeline, TimeoutType, WorkflowExecution,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn key(name: &str) -> DefinitionKey {
    DefinitionKey::new(name, "1")
}

pub fn workflow_type() -> DefinitionKey {
    DefinitionKey::new("swf-sns-workflow", "1")
}

/// `a -> b -> c`
pub fn linear_pipeline(len: usize) -> Arc<Pipeline> {
    let mut builder = Pipeline::builder();
    for index in 0..len {
        builder = builder.single(key(&format!("step_{index}")));
    }
    Arc::new(builder.build().unwrap())
}

/// `a -> group(x, y) -> z`
pub fn group_pipeline(combinator: Combinator) -> Arc<Pipeline> {
    Arc::new(
        Pipeline::builder()
            .single(key("a"))
            .group(vec![key("x"), key("y")], combinator)
            .single(key("z"))
            .build()
            .unwrap(),
    )
}

/// Appends numbered events the way the orchestration service would
pub struct HistoryBuilder {
    events: Vec<HistoryEvent>,
}

impl HistoryBuilder {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn last_event_id(&self) -> i64 {
        self.events.last().map_or(0, |e| e.event_id)
    }

    pub fn push(&mut self, kind: EventKind) -> i64 {
        let event_id = self.last_event_id() + 1;
        self.events.push(HistoryEvent::new(event_id, kind));
        event_id
    }

    pub fn started(&mut self, input: Option<&str>) -> i64 {
        self.push(EventKind::WorkflowExecutionStarted {
            workflow_type: workflow_type(),
            input: input.map(str::to_string),
            task_list: "registration".to_string(),
            child_policy: ChildPolicy::Terminate,
            execution_start_to_close_timeout_ms: 60_000,
            task_start_to_close_timeout_ms: 1_000,
        })
    }

    /// Decision task scheduled, started and completed; returns the started event id
    pub fn decision_round(&mut self) -> i64 {
        let scheduled_event_id = self.push(EventKind::DecisionTaskScheduled {
            task_list: "registration".to_string(),
        });
        let started_event_id = self.push(EventKind::DecisionTaskStarted {
            scheduled_event_id,
            identity: "test-decider".to_string(),
        });
        self.push(EventKind::DecisionTaskCompleted {
            scheduled_event_id,
            started_event_id,
        });
        started_event_id
    }

    /// Scheduled decision task that has been handed out but not answered
    pub fn open_decision(&mut self) -> i64 {
        let scheduled_event_id = self.push(EventKind::DecisionTaskScheduled {
            task_list: "registration".to_string(),
        });
        self.push(EventKind::DecisionTaskStarted {
            scheduled_event_id,
            identity: "test-decider".to_string(),
        })
    }

    pub fn scheduled(&mut self, name: &str, step: usize, member: usize) -> i64 {
        self.push(EventKind::ActivityTaskScheduled {
            activity_type: key(name),
            activity_id: ActivityId::new(step, member).to_string(),
            input: None,
            task_list: "registration-activities".to_string(),
            timeouts: ActivityTimeouts::default(),
            decision_task_completed_event_id: 0,
        })
    }

    pub fn completed(&mut self, scheduled_event_id: i64, result: &Payload) -> i64 {
        self.push(EventKind::ActivityTaskCompleted {
            scheduled_event_id,
            started_event_id: scheduled_event_id + 1,
            result: Some(result.to_text().unwrap()),
        })
    }

    pub fn completed_raw(&mut self, scheduled_event_id: i64, result: &str) -> i64 {
        self.push(EventKind::ActivityTaskCompleted {
            scheduled_event_id,
            started_event_id: scheduled_event_id + 1,
            result: Some(result.to_string()),
        })
    }

    pub fn failed(&mut self, scheduled_event_id: i64, reason: &str) -> i64 {
        self.push(EventKind::ActivityTaskFailed {
            scheduled_event_id,
            started_event_id: scheduled_event_id + 1,
            reason: reason.to_string(),
            details: "test failure".to_string(),
        })
    }

    pub fn timed_out(&mut self, scheduled_event_id: i64, timeout_type: TimeoutType) -> i64 {
        self.push(EventKind::ActivityTaskTimedOut {
            scheduled_event_id,
            started_event_id: None,
            timeout_type,
            details: Some("0 confirmed, 1 pending".to_string()),
        })
    }

    /// Decision task over the whole history so far
    pub fn decision_task(&self, previous_started_event_id: i64) -> DecisionTask {
        DecisionTask {
            task_token: TaskToken::generate(),
            workflow_execution: WorkflowExecution {
                workflow_id: "wf-test".to_string(),
                run_id: Uuid::nil(),
            },
            workflow_type: workflow_type(),
            events: self.events.clone(),
            previous_started_event_id,
            started_event_id: self.last_event_id(),
        }
    }
}

impl Default for HistoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
