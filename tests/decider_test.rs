//! Decider behaviour over hand-built histories: one decision task at a time,
//! always replaying the full history.

mod common;

use common::*;
use registration_workflow::models::{
    Combinator, Decision, EventKind, FailureKind, Payload, TimeoutType,
};
use registration_workflow::orchestration::Decider;
use registration_workflow::state_machine::{DeciderState, StateMachineError};

fn decider_for(pipeline: std::sync::Arc<registration_workflow::models::Pipeline>) -> Decider {
    Decider::new().with_pipeline(workflow_type(), pipeline)
}

fn scheduled_ids(decisions: &[Decision]) -> Vec<(String, String)> {
    decisions
        .iter()
        .filter_map(|decision| match decision {
            Decision::ScheduleActivityTask {
                activity_type,
                activity_id,
                ..
            } => Some((activity_type.name.clone(), activity_id.clone())),
            _ => None,
        })
        .collect()
}

fn scheduled_input(decision: &Decision) -> Payload {
    match decision {
        Decision::ScheduleActivityTask {
            input: Some(input), ..
        } => Payload::from_text(input).unwrap(),
        other => panic!("expected a schedule decision with input, got {other:?}"),
    }
}

#[test]
fn test_first_decision_schedules_first_step() {
    let decider = decider_for(linear_pipeline(3));
    let mut history = HistoryBuilder::new();
    history.started(Some(r#"{"campaign":"spring"}"#));
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(0)).unwrap();

    assert_eq!(
        scheduled_ids(&outcome.decisions),
        vec![("step_0".to_string(), "0.0".to_string())]
    );
    assert_eq!(outcome.state, DeciderState::Scheduling);
    assert_eq!(outcome.cursor, 0);
    let input = scheduled_input(&outcome.decisions[0]);
    assert_eq!(
        input
            .section("execution_input")
            .and_then(|s| s.get_str("campaign").map(str::to_string)),
        Some("spring".to_string())
    );
}

#[test]
fn test_completed_step_schedules_next_with_accumulated_input() {
    let decider = decider_for(linear_pipeline(3));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let first = history.decision_round();
    let scheduled = history.scheduled("step_0", 0, 0);
    history.completed(scheduled, &Payload::new().with("email", "a@example.com"));
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(first)).unwrap();

    assert_eq!(
        scheduled_ids(&outcome.decisions),
        vec![("step_1".to_string(), "1.0".to_string())]
    );
    let input = scheduled_input(&outcome.decisions[0]);
    assert_eq!(
        input
            .section("step_0")
            .and_then(|s| s.get_str("email").map(str::to_string)),
        Some("a@example.com".to_string())
    );
    assert_eq!(outcome.cursor, 1);
}

#[test]
fn test_replay_drops_decisions_already_made() {
    let decider = decider_for(linear_pipeline(3));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let first = history.decision_round();
    let s0 = history.scheduled("step_0", 0, 0);
    history.completed(s0, &Payload::new());
    let second = history.decision_round();
    history.scheduled("step_1", 1, 0);
    history.open_decision();

    // Nothing new happened since step_1 was scheduled
    let outcome = decider.decide(&history.decision_task(second)).unwrap();
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.cursor, 1);

    // Same history delivered as if the second decision never completed
    let outcome = decider.decide(&history.decision_task(first)).unwrap();
    assert_eq!(
        scheduled_ids(&outcome.decisions),
        vec![("step_1".to_string(), "1.0".to_string())]
    );
}

#[test]
fn test_last_step_completes_execution_with_all_results() {
    let decider = decider_for(linear_pipeline(2));
    let mut history = HistoryBuilder::new();
    history.started(None);
    history.decision_round();
    let s0 = history.scheduled("step_0", 0, 0);
    history.completed(s0, &Payload::new().with("topic_ref", "t-1"));
    let previous = history.decision_round();
    let s1 = history.scheduled("step_1", 1, 0);
    history.completed(s1, &Payload::new().with("message_id", "m-1"));
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();

    assert_eq!(outcome.state, DeciderState::Completed);
    match outcome.decisions.as_slice() {
        [Decision::CompleteWorkflowExecution { result: Some(result) }] => {
            let result = Payload::from_text(result).unwrap();
            assert!(result.contains_key("step_0"));
            assert!(result.contains_key("step_1"));
        }
        other => panic!("expected a single completion, got {other:?}"),
    }
}

#[test]
fn test_activity_failure_fails_execution() {
    let decider = decider_for(linear_pipeline(3));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let previous = history.decision_round();
    let s0 = history.scheduled("step_0", 0, 0);
    history.failed(s0, "no input");
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();

    assert_eq!(outcome.state, DeciderState::Failed);
    match outcome.decisions.as_slice() {
        [Decision::FailWorkflowExecution { reason, kind, .. }] => {
            assert_eq!(reason, "no input");
            assert_eq!(*kind, FailureKind::ActivityFailed);
        }
        other => panic!("expected a single failure, got {other:?}"),
    }
}

#[test]
fn test_activity_timeout_times_out_execution() {
    let decider = decider_for(linear_pipeline(3));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let previous = history.decision_round();
    let s0 = history.scheduled("step_0", 0, 0);
    history.timed_out(s0, TimeoutType::Heartbeat);
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();

    assert_eq!(outcome.state, DeciderState::TimedOut);
    match outcome.decisions.as_slice() {
        [Decision::FailWorkflowExecution { details, kind, .. }] => {
            assert_eq!(*kind, FailureKind::ActivityTimedOut);
            assert!(details.contains("step_0"), "details: {details}");
            assert!(details.contains("0 confirmed, 1 pending"), "details: {details}");
        }
        other => panic!("expected a single failure, got {other:?}"),
    }
}

#[test]
fn test_schedule_failure_fails_execution() {
    let decider = decider_for(linear_pipeline(2));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let previous = history.decision_round();
    history.push(EventKind::ScheduleActivityTaskFailed {
        activity_type: key("step_0"),
        activity_id: "0.0".to_string(),
        cause: "ACTIVITY_TYPE_DOES_NOT_EXIST".to_string(),
        decision_task_completed_event_id: previous + 1,
    });
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();

    assert_eq!(outcome.state, DeciderState::Failed);
    assert!(matches!(
        outcome.decisions.as_slice(),
        [Decision::FailWorkflowExecution { details, .. }] if details.contains("ACTIVITY_TYPE_DOES_NOT_EXIST")
    ));
}

#[test]
fn test_any_group_schedules_every_member_and_advances_on_first_success() {
    let decider = decider_for(group_pipeline(Combinator::Any));
    let mut history = HistoryBuilder::new();
    history.started(None);
    let first = history.decision_round();
    let a = history.scheduled("a", 0, 0);
    history.completed(a, &Payload::new());
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(first)).unwrap();
    assert_eq!(
        scheduled_ids(&outcome.decisions),
        vec![
            ("x".to_string(), "1.0".to_string()),
            ("y".to_string(), "1.1".to_string())
        ]
    );

    let mut history = HistoryBuilder::new();
    history.started(None);
    history.decision_round();
    let a = history.scheduled("a", 0, 0);
    history.completed(a, &Payload::new());
    let previous = history.decision_round();
    history.scheduled("x", 1, 0);
    let y = history.scheduled("y", 1, 1);
    history.completed(y, &Payload::new().with("confirmed", "sms"));
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();
    assert_eq!(
        scheduled_ids(&outcome.decisions),
        vec![("z".to_string(), "2.0".to_string())]
    );
    let input = scheduled_input(&outcome.decisions[0]);
    assert!(input.contains_key("y"));
    assert!(!input.contains_key("x"));
}

#[test]
fn test_any_group_outlives_one_failed_member() {
    let decider = decider_for(group_pipeline(Combinator::Any));
    let mut history = HistoryBuilder::new();
    history.started(None);
    history.decision_round();
    let a = history.scheduled("a", 0, 0);
    history.completed(a, &Payload::new());
    let previous = history.decision_round();
    let x = history.scheduled("x", 1, 0);
    let y = history.scheduled("y", 1, 1);
    history.timed_out(x, TimeoutType::Heartbeat);
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.state, DeciderState::Scheduling);

    let previous = history.decision_round();
    history.failed(y, "confirmation wait exceeded");
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();
    assert_eq!(outcome.state, DeciderState::Failed);
    assert!(matches!(
        outcome.decisions.as_slice(),
        [Decision::FailWorkflowExecution { kind: FailureKind::ActivityFailed, .. }]
    ));
}

#[test]
fn test_all_group_fails_on_first_failed_member() {
    let decider = decider_for(group_pipeline(Combinator::All));
    let mut history = HistoryBuilder::new();
    history.started(None);
    history.decision_round();
    let a = history.scheduled("a", 0, 0);
    history.completed(a, &Payload::new());
    let previous = history.decision_round();
    let x = history.scheduled("x", 1, 0);
    let y = history.scheduled("y", 1, 1);
    history.completed(x, &Payload::new());
    history.failed(y, "subscription failed");
    history.open_decision();

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();
    assert_eq!(outcome.state, DeciderState::Failed);
    assert_eq!(outcome.decisions.len(), 1);
}

#[test]
fn test_outcomes_after_close_are_ignored() {
    let decider = decider_for(group_pipeline(Combinator::Any));
    let mut history = HistoryBuilder::new();
    history.started(None);
    history.decision_round();
    let a = history.scheduled("a", 0, 0);
    history.completed(a, &Payload::new());
    history.decision_round();
    let x = history.scheduled("x", 1, 0);
    let y = history.scheduled("y", 1, 1);
    history.completed(x, &Payload::new());
    history.decision_round();
    let z = history.scheduled("z", 2, 0);
    history.completed(z, &Payload::new());
    let previous = history.decision_round();
    history.push(EventKind::WorkflowExecutionCompleted {
        result: None,
        decision_task_completed_event_id: previous + 1,
    });
    history.failed(y, "stale");

    let outcome = decider.decide(&history.decision_task(previous)).unwrap();
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.state, DeciderState::Completed);
}

#[test]
fn test_unknown_workflow_type_is_an_error() {
    let decider = Decider::new();
    let mut history = HistoryBuilder::new();
    history.started(None);
    history.open_decision();

    let result = decider.decide(&history.decision_task(0));
    assert!(matches!(
        result,
        Err(StateMachineError::UnknownWorkflowType { .. })
    ));
}
