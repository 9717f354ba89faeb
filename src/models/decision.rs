//! # Decisions
//!
//! What a decider hands back to the orchestration service at the end of a
//! decision task. The service applies them in order.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::definition::{ActivityRef, ActivityTimeouts};

/// Why an execution is being closed unsuccessfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An activity reported failure or could not be scheduled
    ActivityFailed,
    /// An activity exceeded one of its timeouts
    ActivityTimedOut,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivityFailed => write!(f, "activity_failed"),
            Self::ActivityTimedOut => write!(f, "activity_timed_out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision_type", rename_all = "PascalCase")]
pub enum Decision {
    ScheduleActivityTask {
        activity_type: ActivityRef,
        activity_id: String,
        input: Option<String>,
        /// Overrides the definition's default task list
        task_list: Option<String>,
        /// Overrides the definition's default timeouts
        timeouts: Option<ActivityTimeouts>,
    },
    CompleteWorkflowExecution {
        result: Option<String>,
    },
    FailWorkflowExecution {
        reason: String,
        details: String,
        kind: FailureKind,
    },
}

impl Decision {
    pub fn decision_type(&self) -> &'static str {
        match self {
            Self::ScheduleActivityTask { .. } => "ScheduleActivityTask",
            Self::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Self::FailWorkflowExecution { .. } => "FailWorkflowExecution",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ScheduleActivityTask { .. })
    }
}
