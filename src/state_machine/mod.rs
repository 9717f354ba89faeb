//! # Decider State Machine
//!
//! Pure, history-driven state of a workflow execution as the decider sees it.
//! Nothing in here performs I/O; the orchestration layer feeds events in and
//! forwards the resulting decisions.

pub mod errors;
pub mod execution_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use execution_state_machine::ExecutionStateMachine;
pub use states::DeciderState;
