//! # Messaging Error Types
//!
//! Errors surfaced by orchestration service backends, using thiserror for
//! structured variants instead of `Box<dyn Error>`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Unknown {resource}: {id}")]
    UnknownResource { resource: String, id: String },

    #[error("Domain does not exist: {domain}")]
    DomainDoesNotExist { domain: String },

    #[error("{kind} type already exists: {name}:{version}")]
    TypeAlreadyExists {
        kind: String,
        name: String,
        version: String,
    },

    #[error("{kind} type does not exist: {name}:{version}")]
    TypeDoesNotExist {
        kind: String,
        name: String,
        version: String,
    },

    #[error("Workflow execution already started: {workflow_id}")]
    ExecutionAlreadyStarted { workflow_id: String },

    #[error("Workflow execution is closed: {run_id}")]
    ExecutionClosed { run_id: String },

    #[error("Database query error: {operation}: {message}")]
    DatabaseQuery { operation: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// A task token, run id or similar handle the service no longer knows
    pub fn unknown_resource(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::UnknownResource {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn domain_does_not_exist(domain: impl Into<String>) -> Self {
        Self::DomainDoesNotExist {
            domain: domain.into(),
        }
    }

    pub fn type_already_exists(
        kind: impl ToString,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::TypeAlreadyExists {
            kind: kind.to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn type_does_not_exist(
        kind: impl ToString,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::TypeDoesNotExist {
            kind: kind.to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn execution_closed(run_id: impl ToString) -> Self {
        Self::ExecutionClosed {
            run_id: run_id.to_string(),
        }
    }

    pub fn database_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The task behind a token is gone: completed, timed out or its execution closed
    pub fn is_stale_task(&self) -> bool {
        matches!(
            self,
            Self::UnknownResource { .. } | Self::ExecutionClosed { .. }
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::MessageSerialization {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseQuery {
            operation: "sqlx".to_string(),
            message: err.to_string(),
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
