//! # Domain Models
//!
//! Plain data shared by every component: definitions, pipelines, execution
//! history, decisions and the payloads that flow between steps.

pub mod decision;
pub mod definition;
pub mod execution;
pub mod history;
pub mod payload;
pub mod pipeline;

pub use decision::{Decision, FailureKind};
pub use definition::{
    ActivityDefinition, ActivityOptions, ActivityRef, ActivityTimeouts, ChildPolicy,
    DefinitionKey, DefinitionKind, RegisteredDefinition, Timeout, WorkflowDefinition,
    WorkflowOptions, BASE_VERSION,
};
pub use execution::{ExecutionInfo, ExecutionStatus, WorkflowExecution};
pub use history::{ActivityId, EventKind, HistoryEvent, TimeoutType};
pub use payload::{Payload, EXECUTION_INPUT_KEY};
pub use pipeline::{Combinator, Pipeline, PipelineBuilder, PipelineError, PipelineStep};
