use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ExecutionStatus;

/// Decider view of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeciderState {
    /// Execution started, nothing outstanding yet
    Open,
    /// The step at the cursor has been scheduled and awaits its outcome
    Scheduling,
    /// Every pipeline step was satisfied
    Completed,
    /// A step failed
    Failed,
    /// A step exceeded one of its timeouts
    TimedOut,
}

impl DeciderState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        match self {
            Self::Open | Self::Scheduling => ExecutionStatus::Open,
            Self::Completed => ExecutionStatus::Completed,
            Self::Failed => ExecutionStatus::Failed,
            Self::TimedOut => ExecutionStatus::TimedOut,
        }
    }
}

impl fmt::Display for DeciderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Scheduling => write!(f, "scheduling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl std::str::FromStr for DeciderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "scheduling" => Ok(Self::Scheduling),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(format!("Invalid decider state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_map_to_closed_statuses() {
        assert!(!DeciderState::Open.is_terminal());
        assert!(!DeciderState::Scheduling.is_terminal());
        assert_eq!(
            DeciderState::Scheduling.execution_status(),
            ExecutionStatus::Open
        );
        assert_eq!(
            DeciderState::TimedOut.execution_status(),
            ExecutionStatus::TimedOut
        );
        assert_eq!(
            "timed_out".parse::<DeciderState>().unwrap(),
            DeciderState::TimedOut
        );
    }
}
