use thiserror::Error;

use crate::models::DefinitionKey;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("No pipeline registered for workflow type {workflow_type}")]
    UnknownWorkflowType { workflow_type: DefinitionKey },

    #[error("Inconsistent history at event {event_id}: {message}")]
    InconsistentHistory { event_id: i64, message: String },

    #[error("Payload encoding failed: {message}")]
    PayloadEncoding { message: String },
}

impl From<serde_json::Error> for StateMachineError {
    fn from(err: serde_json::Error) -> Self {
        Self::PayloadEncoding {
            message: err.to_string(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
