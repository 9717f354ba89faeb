//! # Orchestration
//!
//! The decider side of the workflow.
//!
//! - **Decider**: replays an execution history through the state machine and
//!   returns only the decisions the latest events call for
//! - **WorkflowCoordinator**: long-polls decision tasks, runs the decider and
//!   answers each task exactly once
//!
//! Neither keeps state between decision tasks, so any number of coordinators
//! can be started, stopped and restarted against the same task list.

pub mod coordinator;
pub mod decider;

pub use coordinator::{CoordinatorStats, WorkflowCoordinator, WorkflowCoordinatorConfig};
pub use decider::{Decider, DecisionOutcome};
