//! # Definition Registry
//!
//! Idempotent registration of activity and workflow types.
//!
//! Definitions are immutable once created, so a changed set of options can
//! never update an existing `(name, version)`. Instead:
//!
//! ```text
//! same name, equal options exist  -> reuse that definition
//! same name, only other options   -> register next_version(greatest version)
//! no definition with that name    -> register version "1"
//! ```
//!
//! Two registrars racing for the same new version both recover: the loser sees
//! `TypeAlreadyExists`, re-reads the domain and tries again.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use super::versioning::{compare_versions, next_version};
use crate::constants::MAX_REGISTRATION_ATTEMPTS;
use crate::logging::log_registration_operation;
use crate::messaging::{MessagingError, OrchestrationService};
use crate::models::{
    ActivityDefinition, ActivityOptions, DefinitionKey, DefinitionKind, RegisteredDefinition,
    WorkflowDefinition, WorkflowOptions, BASE_VERSION,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Messaging error during registration: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: DefinitionKind,
        name: String,
        reason: String,
    },

    #[error("Could not register {kind} '{name}' after {attempts} attempts")]
    RegistrationConflict {
        kind: DefinitionKind,
        name: String,
        attempts: usize,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Outcome of comparing requested options against existing definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationPlan {
    Reuse(DefinitionKey),
    Register(DefinitionKey),
}

/// Decide how to register `name` with `options` given its existing versions
pub fn plan_registration<'a, O: PartialEq + 'a>(
    name: &str,
    options: &O,
    existing: impl IntoIterator<Item = (&'a DefinitionKey, &'a O)>,
) -> RegistrationPlan {
    let mut versions = Vec::new();
    for (key, existing_options) in existing {
        if key.name != name {
            continue;
        }
        if existing_options == options {
            return RegistrationPlan::Reuse(key.clone());
        }
        versions.push(key.version.as_str());
    }

    let Some(greatest) = versions
        .iter()
        .copied()
        .max_by(|a, b| compare_versions(a, b))
    else {
        return RegistrationPlan::Register(DefinitionKey::new(name, BASE_VERSION));
    };

    let mut candidate = next_version(greatest);
    while versions.contains(&candidate.as_str()) {
        candidate = next_version(&candidate);
    }
    RegistrationPlan::Register(DefinitionKey::new(name, candidate))
}

fn validate_name(kind: DefinitionKind, name: &str) -> RegistryResult<()> {
    let reason = if name.trim().is_empty() {
        Some("name must not be empty")
    } else if name.len() > 256 {
        Some("name must be at most 256 characters")
    } else if name.contains(':') || name.chars().any(char::is_control) {
        Some("name must not contain ':' or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RegistryError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Registers definitions in one domain through the orchestration service
pub struct DefinitionRegistry {
    service: Arc<dyn OrchestrationService>,
    domain: String,
}

impl DefinitionRegistry {
    pub fn new(service: Arc<dyn OrchestrationService>, domain: impl Into<String>) -> Self {
        Self {
            service,
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Register an activity type, reusing an equal definition when one exists
    #[instrument(skip(self, options), fields(domain = %self.domain))]
    pub async fn register_activity(
        &self,
        name: &str,
        options: ActivityOptions,
    ) -> RegistryResult<ActivityDefinition> {
        validate_name(DefinitionKind::Activity, name)?;

        for attempt in 1..=MAX_REGISTRATION_ATTEMPTS {
            let existing: Vec<ActivityDefinition> = self
                .service
                .list_definitions(&self.domain)
                .await?
                .iter()
                .filter_map(RegisteredDefinition::as_activity)
                .cloned()
                .collect();

            let plan = plan_registration(
                name,
                &options,
                existing.iter().map(|d| (&d.key, &d.options)),
            );
            let key = match plan {
                RegistrationPlan::Reuse(key) => {
                    self.log("reuse", DefinitionKind::Activity, &key);
                    return Ok(ActivityDefinition { key, options });
                }
                RegistrationPlan::Register(key) => key,
            };

            let definition = ActivityDefinition {
                key,
                options: options.clone(),
            };
            match self
                .service
                .register_activity_definition(&self.domain, &definition)
                .await
            {
                Ok(()) => {
                    self.log("register", DefinitionKind::Activity, &definition.key);
                    return Ok(definition);
                }
                Err(MessagingError::TypeAlreadyExists { .. }) => {
                    debug!(attempt, key = %definition.key, "Version taken concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::RegistrationConflict {
            kind: DefinitionKind::Activity,
            name: name.to_string(),
            attempts: MAX_REGISTRATION_ATTEMPTS,
        })
    }

    /// Register a workflow type, reusing an equal definition when one exists
    #[instrument(skip(self, options), fields(domain = %self.domain))]
    pub async fn register_workflow(
        &self,
        name: &str,
        options: WorkflowOptions,
    ) -> RegistryResult<WorkflowDefinition> {
        validate_name(DefinitionKind::Workflow, name)?;

        for attempt in 1..=MAX_REGISTRATION_ATTEMPTS {
            let existing: Vec<WorkflowDefinition> = self
                .service
                .list_definitions(&self.domain)
                .await?
                .iter()
                .filter_map(RegisteredDefinition::as_workflow)
                .cloned()
                .collect();

            let plan = plan_registration(
                name,
                &options,
                existing.iter().map(|d| (&d.key, &d.options)),
            );
            let key = match plan {
                RegistrationPlan::Reuse(key) => {
                    self.log("reuse", DefinitionKind::Workflow, &key);
                    return Ok(WorkflowDefinition { key, options });
                }
                RegistrationPlan::Register(key) => key,
            };

            let definition = WorkflowDefinition {
                key,
                options: options.clone(),
            };
            match self
                .service
                .register_workflow_definition(&self.domain, &definition)
                .await
            {
                Ok(()) => {
                    self.log("register", DefinitionKind::Workflow, &definition.key);
                    return Ok(definition);
                }
                Err(MessagingError::TypeAlreadyExists { .. }) => {
                    debug!(attempt, key = %definition.key, "Version taken concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::RegistrationConflict {
            kind: DefinitionKind::Workflow,
            name: name.to_string(),
            attempts: MAX_REGISTRATION_ATTEMPTS,
        })
    }

    /// Look up one exact definition
    pub async fn find(
        &self,
        kind: DefinitionKind,
        key: &DefinitionKey,
    ) -> RegistryResult<Option<RegisteredDefinition>> {
        Ok(self
            .service
            .list_definitions(&self.domain)
            .await?
            .into_iter()
            .find(|d| d.kind() == kind && d.key() == key))
    }

    /// The greatest registered version of a name
    pub async fn latest(
        &self,
        kind: DefinitionKind,
        name: &str,
    ) -> RegistryResult<Option<RegisteredDefinition>> {
        Ok(self
            .service
            .list_definitions(&self.domain)
            .await?
            .into_iter()
            .filter(|d| d.kind() == kind && d.key().name == name)
            .max_by(|a, b| compare_versions(&a.key().version, &b.key().version)))
    }

    fn log(&self, operation: &str, kind: DefinitionKind, key: &DefinitionKey) {
        log_registration_operation(
            operation,
            &self.domain,
            &kind.to_string(),
            &key.name,
            &key.version,
            None,
        );
    }
}
