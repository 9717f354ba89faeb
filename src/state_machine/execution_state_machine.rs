//! # Execution State Machine
//!
//! Folds a workflow execution's history into the decider's view of it:
//! pipeline cursor, per-member outcomes of the current step and the
//! accumulated results. Every call to [`ExecutionStateMachine::apply`]
//! returns the decisions that event warrants.
//!
//! Deciders build a fresh machine for every decision task and replay the
//! full history into it. Nothing here survives a restart.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::errors::{StateMachineError, StateMachineResult};
use super::states::DeciderState;
use crate::constants::reasons;
use crate::models::{
    ActivityId, Combinator, Decision, DefinitionKey, EventKind, FailureKind, HistoryEvent,
    Payload, Pipeline, PipelineStep, TimeoutType, EXECUTION_INPUT_KEY,
};

#[derive(Debug, Clone)]
struct ScheduledActivity {
    id: ActivityId,
    activity_type: DefinitionKey,
}

#[derive(Debug, Clone, PartialEq)]
enum MemberOutcome {
    Pending,
    Succeeded(Payload),
    Failed {
        reason: String,
        details: String,
    },
    TimedOut {
        timeout_type: TimeoutType,
        details: Option<String>,
    },
}

impl MemberOutcome {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    pipeline: Arc<Pipeline>,
    state: DeciderState,
    started: bool,
    cursor: usize,
    accumulated: Payload,
    members: Vec<MemberOutcome>,
    scheduled: HashMap<i64, ScheduledActivity>,
    last_event_id: i64,
}

impl ExecutionStateMachine {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            state: DeciderState::Open,
            started: false,
            cursor: 0,
            accumulated: Payload::new(),
            members: Vec::new(),
            scheduled: HashMap::new(),
            last_event_id: 0,
        }
    }

    /// Build a machine from a complete history, discarding decisions
    pub fn replay<'a>(
        pipeline: Arc<Pipeline>,
        events: impl IntoIterator<Item = &'a HistoryEvent>,
    ) -> StateMachineResult<Self> {
        let mut machine = Self::new(pipeline);
        for event in events {
            machine.apply(event)?;
        }
        Ok(machine)
    }

    pub fn state(&self) -> DeciderState {
        self.state
    }

    /// Index of the step currently being worked on; equals the pipeline
    /// length once every step has been satisfied
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn accumulated(&self) -> &Payload {
        &self.accumulated
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    /// Feed one history event and collect the decisions it produces
    pub fn apply(&mut self, event: &HistoryEvent) -> StateMachineResult<Vec<Decision>> {
        if event.event_id <= self.last_event_id {
            debug!(
                event_id = event.event_id,
                last_event_id = self.last_event_id,
                event_type = event.event_type(),
                "Ignoring already applied history event"
            );
            return Ok(Vec::new());
        }
        self.last_event_id = event.event_id;

        match &event.kind {
            EventKind::WorkflowExecutionStarted { input, .. } => {
                self.on_execution_started(event.event_id, input.as_deref())
            }
            EventKind::ActivityTaskScheduled {
                activity_type,
                activity_id,
                ..
            } => {
                match activity_id.parse::<ActivityId>() {
                    Ok(id) => {
                        self.scheduled.insert(
                            event.event_id,
                            ScheduledActivity {
                                id,
                                activity_type: activity_type.clone(),
                            },
                        );
                    }
                    Err(reason) => warn!(
                        event_id = event.event_id,
                        activity_id = %activity_id,
                        reason = %reason,
                        "Scheduled activity id does not encode a pipeline position"
                    ),
                }
                Ok(Vec::new())
            }
            EventKind::ScheduleActivityTaskFailed {
                activity_type,
                activity_id,
                cause,
                ..
            } => match activity_id.parse::<ActivityId>() {
                Ok(id) => self.resolve_member(
                    id,
                    activity_type,
                    MemberOutcome::Failed {
                        reason: "schedule activity task failed".to_string(),
                        details: cause.clone(),
                    },
                ),
                Err(_) => Ok(Vec::new()),
            },
            EventKind::ActivityTaskCompleted {
                scheduled_event_id,
                result,
                ..
            } => {
                let Some(scheduled) = self.lookup(*scheduled_event_id, event.event_id) else {
                    return Ok(Vec::new());
                };
                let parsed = match result.as_deref() {
                    None => Ok(Payload::new()),
                    Some(text) => Payload::from_text(text),
                };
                match parsed {
                    Ok(payload) => self.resolve_member(
                        scheduled.id,
                        &scheduled.activity_type,
                        MemberOutcome::Succeeded(payload),
                    ),
                    Err(err) => self.resolve_member(
                        scheduled.id,
                        &scheduled.activity_type,
                        MemberOutcome::Failed {
                            reason: reasons::MALFORMED_RESULT.to_string(),
                            details: err.to_string(),
                        },
                    ),
                }
            }
            EventKind::ActivityTaskFailed {
                scheduled_event_id,
                reason,
                details,
                ..
            } => {
                let Some(scheduled) = self.lookup(*scheduled_event_id, event.event_id) else {
                    return Ok(Vec::new());
                };
                self.resolve_member(
                    scheduled.id,
                    &scheduled.activity_type,
                    MemberOutcome::Failed {
                        reason: reason.clone(),
                        details: details.clone(),
                    },
                )
            }
            EventKind::ActivityTaskTimedOut {
                scheduled_event_id,
                timeout_type,
                details,
                ..
            } => {
                let Some(scheduled) = self.lookup(*scheduled_event_id, event.event_id) else {
                    return Ok(Vec::new());
                };
                self.resolve_member(
                    scheduled.id,
                    &scheduled.activity_type,
                    MemberOutcome::TimedOut {
                        timeout_type: *timeout_type,
                        details: details.clone(),
                    },
                )
            }
            EventKind::WorkflowExecutionCompleted { .. } => {
                self.close(DeciderState::Completed);
                Ok(Vec::new())
            }
            EventKind::WorkflowExecutionFailed { .. } => {
                self.close(DeciderState::Failed);
                Ok(Vec::new())
            }
            EventKind::WorkflowExecutionTimedOut { .. } => {
                self.close(DeciderState::TimedOut);
                Ok(Vec::new())
            }
            EventKind::DecisionTaskScheduled { .. }
            | EventKind::DecisionTaskStarted { .. }
            | EventKind::DecisionTaskCompleted { .. }
            | EventKind::DecisionTaskTimedOut { .. }
            | EventKind::ActivityTaskStarted { .. } => Ok(Vec::new()),
        }
    }

    fn on_execution_started(
        &mut self,
        event_id: i64,
        input: Option<&str>,
    ) -> StateMachineResult<Vec<Decision>> {
        if self.started {
            warn!(event_id, "Duplicate execution start ignored");
            return Ok(Vec::new());
        }
        self.started = true;

        if let Some(text) = input {
            match Payload::from_text(text) {
                Ok(payload) => self.accumulated.insert_section(EXECUTION_INPUT_KEY, payload),
                Err(_) => self
                    .accumulated
                    .insert(EXECUTION_INPUT_KEY, Value::String(text.to_string())),
            }
        }

        self.schedule_current_step(event_id)
    }

    fn lookup(&self, scheduled_event_id: i64, event_id: i64) -> Option<ScheduledActivity> {
        let scheduled = self.scheduled.get(&scheduled_event_id).cloned();
        if scheduled.is_none() {
            warn!(
                event_id,
                scheduled_event_id, "Activity outcome references an unknown scheduled event"
            );
        }
        scheduled
    }

    fn schedule_current_step(&mut self, event_id: i64) -> StateMachineResult<Vec<Decision>> {
        let step = self.current_step(event_id)?.clone();
        let input = self.accumulated.to_text()?;

        self.members = vec![MemberOutcome::Pending; step.members().len()];
        self.state = DeciderState::Scheduling;

        debug!(cursor = self.cursor, step = %step, "Scheduling pipeline step");

        Ok(step
            .members()
            .iter()
            .enumerate()
            .map(|(member, activity)| Decision::ScheduleActivityTask {
                activity_type: activity.clone(),
                activity_id: ActivityId::new(self.cursor, member).to_string(),
                input: Some(input.clone()),
                task_list: None,
                timeouts: None,
            })
            .collect())
    }

    fn current_step(&self, event_id: i64) -> StateMachineResult<&PipelineStep> {
        self.pipeline
            .step(self.cursor)
            .ok_or_else(|| StateMachineError::InconsistentHistory {
                event_id,
                message: format!(
                    "cursor {} is beyond a pipeline of {} steps",
                    self.cursor,
                    self.pipeline.len()
                ),
            })
    }

    fn resolve_member(
        &mut self,
        id: ActivityId,
        activity_type: &DefinitionKey,
        outcome: MemberOutcome,
    ) -> StateMachineResult<Vec<Decision>> {
        if self.state.is_terminal() {
            debug!(activity_id = %id, state = %self.state, "Outcome after close ignored");
            return Ok(Vec::new());
        }
        if id.step != self.cursor {
            debug!(
                activity_id = %id,
                cursor = self.cursor,
                "Stale outcome for a step other than the current one"
            );
            return Ok(Vec::new());
        }
        match self.members.get(id.member) {
            Some(slot) if slot.is_pending() => {}
            Some(_) => {
                debug!(activity_id = %id, "Duplicate outcome for an already resolved member");
                return Ok(Vec::new());
            }
            None => {
                warn!(activity_id = %id, "Outcome for a member the step does not have");
                return Ok(Vec::new());
            }
        }

        let step = self.current_step(self.last_event_id)?.clone();
        self.members[id.member] = outcome.clone();

        match &step {
            PipelineStep::Single(_)
            | PipelineStep::Group {
                combinator: Combinator::All,
                ..
            } => {
                if outcome.is_unsuccessful() {
                    return Ok(vec![self.fail_with(activity_type, &outcome)]);
                }
                if self.members.iter().all(|m| matches!(m, MemberOutcome::Succeeded(_))) {
                    return self.advance(&step);
                }
                Ok(Vec::new())
            }
            PipelineStep::Group {
                combinator: Combinator::Any,
                members,
            } => {
                if matches!(outcome, MemberOutcome::Succeeded(_)) {
                    return self.advance(&step);
                }
                if self.members.iter().all(MemberOutcome::is_unsuccessful) {
                    return Ok(vec![self.fail_group(members)]);
                }
                debug!(
                    activity_id = %id,
                    "Parallel member failed, waiting for the remaining members"
                );
                Ok(Vec::new())
            }
        }
    }

    fn advance(&mut self, step: &PipelineStep) -> StateMachineResult<Vec<Decision>> {
        for (activity, outcome) in step.members().iter().zip(&self.members) {
            if let MemberOutcome::Succeeded(result) = outcome {
                self.accumulated
                    .insert_section(activity.name.clone(), result.clone());
            }
        }
        self.members.clear();
        self.cursor += 1;

        if self.cursor >= self.pipeline.len() {
            self.state = DeciderState::Completed;
            debug!(steps = self.pipeline.len(), "Pipeline exhausted, completing execution");
            return Ok(vec![Decision::CompleteWorkflowExecution {
                result: Some(self.accumulated.to_text()?),
            }]);
        }

        self.schedule_current_step(self.last_event_id)
    }

    fn fail_with(&mut self, activity_type: &DefinitionKey, outcome: &MemberOutcome) -> Decision {
        match outcome {
            MemberOutcome::TimedOut {
                timeout_type,
                details,
            } => {
                self.state = DeciderState::TimedOut;
                Decision::FailWorkflowExecution {
                    reason: "activity timed out".to_string(),
                    details: timeout_details(activity_type, *timeout_type, details.as_deref()),
                    kind: FailureKind::ActivityTimedOut,
                }
            }
            MemberOutcome::Failed { reason, details } => {
                self.state = DeciderState::Failed;
                Decision::FailWorkflowExecution {
                    reason: reason.clone(),
                    details: format!("{}: {details}", activity_type.name),
                    kind: FailureKind::ActivityFailed,
                }
            }
            MemberOutcome::Pending | MemberOutcome::Succeeded(_) => {
                self.state = DeciderState::Failed;
                Decision::FailWorkflowExecution {
                    reason: "activity failed".to_string(),
                    details: activity_type.name.clone(),
                    kind: FailureKind::ActivityFailed,
                }
            }
        }
    }

    fn fail_group(&mut self, members: &[DefinitionKey]) -> Decision {
        let all_timed_out = self
            .members
            .iter()
            .all(|m| matches!(m, MemberOutcome::TimedOut { .. }));

        let summaries: Vec<String> = members
            .iter()
            .zip(&self.members)
            .map(|(activity, outcome)| match outcome {
                MemberOutcome::TimedOut {
                    timeout_type,
                    details,
                } => timeout_details(activity, *timeout_type, details.as_deref()),
                MemberOutcome::Failed { reason, details } => {
                    format!("{}: {reason} ({details})", activity.name)
                }
                MemberOutcome::Pending | MemberOutcome::Succeeded(_) => activity.name.clone(),
            })
            .collect();

        if all_timed_out {
            self.state = DeciderState::TimedOut;
            Decision::FailWorkflowExecution {
                reason: "all parallel activities timed out".to_string(),
                details: summaries.join("; "),
                kind: FailureKind::ActivityTimedOut,
            }
        } else {
            self.state = DeciderState::Failed;
            Decision::FailWorkflowExecution {
                reason: "all parallel activities failed".to_string(),
                details: summaries.join("; "),
                kind: FailureKind::ActivityFailed,
            }
        }
    }

    fn close(&mut self, state: DeciderState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }
}

fn timeout_details(
    activity_type: &DefinitionKey,
    timeout_type: TimeoutType,
    last_heartbeat: Option<&str>,
) -> String {
    match last_heartbeat {
        Some(details) => format!(
            "{} exceeded its {timeout_type} timeout (last heartbeat: {details})",
            activity_type.name
        ),
        None => format!("{} exceeded its {timeout_type} timeout", activity_type.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityTimeouts, ChildPolicy};

    struct History {
        next_id: i64,
    }

    impl History {
        fn new() -> Self {
            Self { next_id: 1 }
        }

        fn event(&mut self, kind: EventKind) -> HistoryEvent {
            let event = HistoryEvent::new(self.next_id, kind);
            self.next_id += 1;
            event
        }

        fn started(&mut self, input: Option<&str>) -> HistoryEvent {
            self.event(EventKind::WorkflowExecutionStarted {
                workflow_type: DefinitionKey::new("subscription_workflow", "1"),
                input: input.map(str::to_string),
                task_list: "registration".to_string(),
                child_policy: ChildPolicy::Terminate,
                execution_start_to_close_timeout_ms: 60_000,
                task_start_to_close_timeout_ms: 1_000,
            })
        }

        fn scheduled(&mut self, name: &str, step: usize, member: usize) -> HistoryEvent {
            self.event(EventKind::ActivityTaskScheduled {
                activity_type: DefinitionKey::new(name, "1"),
                activity_id: ActivityId::new(step, member).to_string(),
                input: None,
                task_list: "registration-activities".to_string(),
                timeouts: ActivityTimeouts::default(),
                decision_task_completed_event_id: 0,
            })
        }

        fn completed(&mut self, scheduled_event_id: i64, result: &str) -> HistoryEvent {
            self.event(EventKind::ActivityTaskCompleted {
                scheduled_event_id,
                started_event_id: scheduled_event_id + 1,
                result: Some(result.to_string()),
            })
        }

        fn failed(&mut self, scheduled_event_id: i64, reason: &str) -> HistoryEvent {
            self.event(EventKind::ActivityTaskFailed {
                scheduled_event_id,
                started_event_id: scheduled_event_id + 1,
                reason: reason.to_string(),
                details: "details".to_string(),
            })
        }

        fn timed_out(&mut self, scheduled_event_id: i64) -> HistoryEvent {
            self.event(EventKind::ActivityTaskTimedOut {
                scheduled_event_id,
                started_event_id: None,
                timeout_type: TimeoutType::Heartbeat,
                details: None,
            })
        }
    }

    fn key(name: &str) -> DefinitionKey {
        DefinitionKey::new(name, "1")
    }

    fn linear() -> Arc<Pipeline> {
        Arc::new(
            Pipeline::builder()
                .single(key("a"))
                .single(key("b"))
                .build()
                .unwrap(),
        )
    }

    fn with_group(combinator: Combinator) -> Arc<Pipeline> {
        Arc::new(
            Pipeline::builder()
                .single(key("a"))
                .group(vec![key("x"), key("y")], combinator)
                .single(key("z"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_start_schedules_first_step_with_execution_input() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        let decisions = machine
            .apply(&history.started(Some(r#"{"source":"cli"}"#)))
            .unwrap();

        assert_eq!(machine.state(), DeciderState::Scheduling);
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::ScheduleActivityTask {
                activity_type,
                activity_id,
                input,
                ..
            } => {
                assert_eq!(activity_type.name, "a");
                assert_eq!(activity_id, "0.0");
                let input = Payload::from_text(input.as_deref().unwrap()).unwrap();
                let carried = input.section(EXECUTION_INPUT_KEY).unwrap();
                assert_eq!(carried.get_str("source"), Some("cli"));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_completion_accumulates_and_completes() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        let next = machine
            .apply(&history.completed(a.event_id, r#"{"email":"a@b.com"}"#))
            .unwrap();
        assert_eq!(machine.cursor(), 1);

        let Decision::ScheduleActivityTask { input, .. } = &next[0] else {
            panic!("expected schedule decision");
        };
        let input = Payload::from_text(input.as_deref().unwrap()).unwrap();
        assert_eq!(
            input.section("a").unwrap().get_str("email"),
            Some("a@b.com")
        );

        let b = history.scheduled("b", 1, 0);
        machine.apply(&b).unwrap();
        let done = machine.apply(&history.completed(b.event_id, "{}")).unwrap();

        assert_eq!(machine.state(), DeciderState::Completed);
        assert_eq!(machine.cursor(), 2);
        assert!(matches!(
            done.as_slice(),
            [Decision::CompleteWorkflowExecution { .. }]
        ));
    }

    #[test]
    fn test_failure_terminates_once() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        let decisions = machine.apply(&history.failed(a.event_id, "no input")).unwrap();

        assert_eq!(machine.state(), DeciderState::Failed);
        match &decisions[..] {
            [Decision::FailWorkflowExecution { reason, kind, .. }] => {
                assert_eq!(reason, "no input");
                assert_eq!(*kind, FailureKind::ActivityFailed);
            }
            other => panic!("unexpected decisions {other:?}"),
        }

        let late = machine.apply(&history.completed(a.event_id, "{}")).unwrap();
        assert!(late.is_empty());
        assert_eq!(machine.state(), DeciderState::Failed);
    }

    #[test]
    fn test_timeout_maps_to_timed_out() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        let decisions = machine.apply(&history.timed_out(a.event_id)).unwrap();

        assert_eq!(machine.state(), DeciderState::TimedOut);
        assert!(matches!(
            decisions.as_slice(),
            [Decision::FailWorkflowExecution {
                kind: FailureKind::ActivityTimedOut,
                ..
            }]
        ));
    }

    #[test]
    fn test_malformed_result_fails_execution() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        let decisions = machine.apply(&history.completed(a.event_id, "[]")).unwrap();

        assert_eq!(machine.state(), DeciderState::Failed);
        assert!(matches!(
            decisions.as_slice(),
            [Decision::FailWorkflowExecution { reason, .. }] if reason == "malformed activity result"
        ));
    }

    #[test]
    fn test_any_group_waits_for_remaining_member_after_failure() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(with_group(Combinator::Any));

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        let group = machine.apply(&history.completed(a.event_id, "{}")).unwrap();
        assert_eq!(group.len(), 2);

        let x = history.scheduled("x", 1, 0);
        let y = history.scheduled("y", 1, 1);
        machine.apply(&x).unwrap();
        machine.apply(&y).unwrap();

        assert!(machine
            .apply(&history.failed(x.event_id, "nothing pending"))
            .unwrap()
            .is_empty());
        assert_eq!(machine.cursor(), 1);

        let next = machine
            .apply(&history.completed(y.event_id, r#"{"confirmed_count":1}"#))
            .unwrap();
        assert_eq!(machine.cursor(), 2);
        assert!(machine.accumulated().contains_key("y"));
        assert!(!machine.accumulated().contains_key("x"));
        assert!(matches!(
            next.as_slice(),
            [Decision::ScheduleActivityTask { activity_id, .. }] if activity_id == "2.0"
        ));
    }

    #[test]
    fn test_any_group_with_all_members_timed_out_is_timed_out() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(with_group(Combinator::Any));

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        machine.apply(&history.completed(a.event_id, "{}")).unwrap();
        let x = history.scheduled("x", 1, 0);
        let y = history.scheduled("y", 1, 1);
        machine.apply(&x).unwrap();
        machine.apply(&y).unwrap();

        machine.apply(&history.timed_out(x.event_id)).unwrap();
        let decisions = machine.apply(&history.timed_out(y.event_id)).unwrap();

        assert_eq!(machine.state(), DeciderState::TimedOut);
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn test_all_group_requires_every_member() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(with_group(Combinator::All));

        machine.apply(&history.started(None)).unwrap();
        let a = history.scheduled("a", 0, 0);
        machine.apply(&a).unwrap();
        machine.apply(&history.completed(a.event_id, "{}")).unwrap();
        let x = history.scheduled("x", 1, 0);
        let y = history.scheduled("y", 1, 1);
        machine.apply(&x).unwrap();
        machine.apply(&y).unwrap();

        assert!(machine
            .apply(&history.completed(x.event_id, "{}"))
            .unwrap()
            .is_empty());
        assert_eq!(machine.cursor(), 1);
        let next = machine.apply(&history.completed(y.event_id, "{}")).unwrap();
        assert_eq!(machine.cursor(), 2);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_reapplying_old_event_ids_is_a_no_op() {
        let mut history = History::new();
        let mut machine = ExecutionStateMachine::new(linear());

        let start = history.started(None);
        machine.apply(&start).unwrap();
        assert!(machine.apply(&start).unwrap().is_empty());
        assert_eq!(machine.last_event_id(), 1);
    }
}
