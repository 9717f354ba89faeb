//! # Execution History
//!
//! The ordered, append-only event log of a workflow execution. Event ids
//! start at 1 and increase by exactly one. The decider's entire state is a
//! pure function of this log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::definition::{ActivityTimeouts, ChildPolicy, DefinitionKey};

/// Which activity timeout fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutType {
    ScheduleToStart,
    StartToClose,
    ScheduleToClose,
    Heartbeat,
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduleToStart => write!(f, "SCHEDULE_TO_START"),
            Self::StartToClose => write!(f, "START_TO_CLOSE"),
            Self::ScheduleToClose => write!(f, "SCHEDULE_TO_CLOSE"),
            Self::Heartbeat => write!(f, "HEARTBEAT"),
        }
    }
}

/// Pipeline position encoded into every scheduled activity id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId {
    pub step: usize,
    pub member: usize,
}

impl ActivityId {
    pub fn new(step: usize, member: usize) -> Self {
        Self { step, member }
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.member)
    }
}

impl std::str::FromStr for ActivityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (step, member) = s
            .split_once('.')
            .ok_or_else(|| format!("Invalid activity id: {s}"))?;
        let step = step
            .parse()
            .map_err(|_| format!("Invalid activity id step: {s}"))?;
        let member = member
            .parse()
            .map_err(|_| format!("Invalid activity id member: {s}"))?;
        Ok(Self { step, member })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "PascalCase")]
pub enum EventKind {
    WorkflowExecutionStarted {
        workflow_type: DefinitionKey,
        input: Option<String>,
        task_list: String,
        child_policy: ChildPolicy,
        execution_start_to_close_timeout_ms: u64,
        task_start_to_close_timeout_ms: u64,
    },
    DecisionTaskScheduled {
        task_list: String,
    },
    DecisionTaskStarted {
        scheduled_event_id: i64,
        identity: String,
    },
    DecisionTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
    },
    DecisionTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: i64,
    },
    ActivityTaskScheduled {
        activity_type: DefinitionKey,
        activity_id: String,
        input: Option<String>,
        task_list: String,
        timeouts: ActivityTimeouts,
        decision_task_completed_event_id: i64,
    },
    ScheduleActivityTaskFailed {
        activity_type: DefinitionKey,
        activity_id: String,
        cause: String,
        decision_task_completed_event_id: i64,
    },
    ActivityTaskStarted {
        scheduled_event_id: i64,
        identity: String,
    },
    ActivityTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Option<String>,
    },
    ActivityTaskFailed {
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: String,
        details: String,
    },
    ActivityTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: Option<i64>,
        timeout_type: TimeoutType,
        /// Details of the last heartbeat, if any
        details: Option<String>,
    },
    WorkflowExecutionCompleted {
        result: Option<String>,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionFailed {
        reason: String,
        details: String,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionTimedOut {
        reason: String,
    },
}

impl EventKind {
    /// Name of the event type, as written in the history
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            Self::DecisionTaskScheduled { .. } => "DecisionTaskScheduled",
            Self::DecisionTaskStarted { .. } => "DecisionTaskStarted",
            Self::DecisionTaskCompleted { .. } => "DecisionTaskCompleted",
            Self::DecisionTaskTimedOut { .. } => "DecisionTaskTimedOut",
            Self::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            Self::ScheduleActivityTaskFailed { .. } => "ScheduleActivityTaskFailed",
            Self::ActivityTaskStarted { .. } => "ActivityTaskStarted",
            Self::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            Self::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            Self::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            Self::WorkflowExecutionCompleted { .. } => "WorkflowExecutionCompleted",
            Self::WorkflowExecutionFailed { .. } => "WorkflowExecutionFailed",
            Self::WorkflowExecutionTimedOut { .. } => "WorkflowExecutionTimedOut",
        }
    }

    /// Events that give the decider something new to react to
    pub fn requires_decision(&self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionStarted { .. }
                | Self::DecisionTaskTimedOut { .. }
                | Self::ScheduleActivityTaskFailed { .. }
                | Self::ActivityTaskCompleted { .. }
                | Self::ActivityTaskFailed { .. }
                | Self::ActivityTaskTimedOut { .. }
        )
    }

    pub fn closes_execution(&self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionCompleted { .. }
                | Self::WorkflowExecutionFailed { .. }
                | Self::WorkflowExecutionTimedOut { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    pub event_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl HistoryEvent {
    pub fn new(event_id: i64, kind: EventKind) -> Self {
        Self {
            event_id,
            event_timestamp: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_id_round_trip() {
        let id = ActivityId::new(2, 1);
        assert_eq!(id.to_string(), "2.1");
        assert_eq!("2.1".parse::<ActivityId>().unwrap(), id);
        assert!("2".parse::<ActivityId>().is_err());
        assert!("a.b".parse::<ActivityId>().is_err());
    }

    #[test]
    fn test_event_serializes_with_flat_event_type() {
        let event = HistoryEvent::new(
            7,
            EventKind::ActivityTaskTimedOut {
                scheduled_event_id: 5,
                started_event_id: Some(6),
                timeout_type: TimeoutType::Heartbeat,
                details: Some("0 confirmed, 1 pending".to_string()),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "ActivityTaskTimedOut");
        assert_eq!(json["timeout_type"], "HEARTBEAT");
        assert_eq!(json["event_id"], 7);

        let parsed: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_decision_triggers() {
        let completed = EventKind::ActivityTaskCompleted {
            scheduled_event_id: 1,
            started_event_id: 2,
            result: None,
        };
        let started = EventKind::ActivityTaskStarted {
            scheduled_event_id: 1,
            identity: "worker".to_string(),
        };
        assert!(completed.requires_decision());
        assert!(!started.requires_decision());
        assert!(EventKind::WorkflowExecutionTimedOut {
            reason: "execution timeout".to_string()
        }
        .closes_execution());
    }
}
