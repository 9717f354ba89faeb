use std::fmt;

use crate::config::ConfigurationError;
use crate::interfaces::NotificationError;
use crate::messaging::MessagingError;
use crate::models::PipelineError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    ConfigurationError(String),
    MessagingError(String),
    RegistrationError(String),
    DecisionError(String),
    ActivityError(String),
    NotificationError(String),
    ValidationError(String),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            WorkflowError::MessagingError(msg) => write!(f, "Messaging error: {msg}"),
            WorkflowError::RegistrationError(msg) => write!(f, "Registration error: {msg}"),
            WorkflowError::DecisionError(msg) => write!(f, "Decision error: {msg}"),
            WorkflowError::ActivityError(msg) => write!(f, "Activity error: {msg}"),
            WorkflowError::NotificationError(msg) => write!(f, "Notification error: {msg}"),
            WorkflowError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<ConfigurationError> for WorkflowError {
    fn from(err: ConfigurationError) -> Self {
        WorkflowError::ConfigurationError(err.to_string())
    }
}

impl From<MessagingError> for WorkflowError {
    fn from(err: MessagingError) -> Self {
        WorkflowError::MessagingError(err.to_string())
    }
}

impl From<RegistryError> for WorkflowError {
    fn from(err: RegistryError) -> Self {
        WorkflowError::RegistrationError(err.to_string())
    }
}

impl From<StateMachineError> for WorkflowError {
    fn from(err: StateMachineError) -> Self {
        WorkflowError::DecisionError(err.to_string())
    }
}

impl From<PipelineError> for WorkflowError {
    fn from(err: PipelineError) -> Self {
        WorkflowError::ValidationError(err.to_string())
    }
}

impl From<NotificationError> for WorkflowError {
    fn from(err: NotificationError) -> Self {
        WorkflowError::NotificationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
