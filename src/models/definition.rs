//! # Activity and Workflow Definitions
//!
//! Named, versioned, immutable definitions registered with the orchestration
//! service. A definition is identified by its [`DefinitionKey`]; changing any
//! option requires registering a new version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Base version used when a name is registered for the first time
pub const BASE_VERSION: &str = "1";

/// Identity of a registered definition: `(name, version)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionKey {
    pub name: String,
    pub version: String,
}

impl DefinitionKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Reference from a pipeline step to a registered activity definition
pub type ActivityRef = DefinitionKey;

/// A bounded duration, or no bound at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    None,
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond count where zero means "no timeout"
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self::None
        } else {
            Self::After(Duration::from_millis(millis))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::After(duration) => Some(*duration),
        }
    }

    /// True when `elapsed` has passed the bound
    pub fn is_exceeded_by(&self, elapsed: Duration) -> bool {
        match self {
            Self::None => false,
            Self::After(limit) => elapsed >= *limit,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::After(duration) => write!(f, "{}ms", duration.as_millis()),
        }
    }
}

/// The four activity timeouts enforced by the orchestration service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityTimeouts {
    /// Maximum queueing delay before a worker picks the task up
    pub schedule_to_start: Timeout,
    /// Maximum execution time once a worker has started the task
    pub start_to_close: Timeout,
    /// Maximum total time from scheduling to completion
    pub schedule_to_close: Timeout,
    /// Maximum silence between heartbeats while the task is running
    pub heartbeat: Timeout,
}

impl Default for ActivityTimeouts {
    fn default() -> Self {
        Self {
            schedule_to_start: Timeout::After(Duration::from_secs(120)),
            start_to_close: Timeout::After(Duration::from_secs(3600)),
            schedule_to_close: Timeout::After(Duration::from_secs(3800)),
            heartbeat: Timeout::None,
        }
    }
}

/// Default options attached to an activity definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOptions {
    pub timeouts: ActivityTimeouts,
    pub default_task_list: String,
    pub description: Option<String>,
}

/// Action taken on still-open child work when an execution closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildPolicy {
    Terminate,
    RequestCancel,
    Abandon,
}

impl fmt::Display for ChildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => write!(f, "terminate"),
            Self::RequestCancel => write!(f, "request_cancel"),
            Self::Abandon => write!(f, "abandon"),
        }
    }
}

impl std::str::FromStr for ChildPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terminate" => Ok(Self::Terminate),
            "request_cancel" => Ok(Self::RequestCancel),
            "abandon" => Ok(Self::Abandon),
            _ => Err(format!("Invalid child policy: {s}")),
        }
    }
}

/// Default options attached to a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOptions {
    pub child_policy: ChildPolicy,
    pub execution_start_to_close: Duration,
    /// Decision task start-to-close timeout
    pub task_start_to_close: Duration,
    pub default_task_list: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub key: DefinitionKey,
    pub options: ActivityOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub key: DefinitionKey,
    pub options: WorkflowOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Activity,
    Workflow,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity => write!(f, "activity"),
            Self::Workflow => write!(f, "workflow"),
        }
    }
}

/// Any definition as listed by the orchestration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegisteredDefinition {
    Activity(ActivityDefinition),
    Workflow(WorkflowDefinition),
}

impl RegisteredDefinition {
    pub fn key(&self) -> &DefinitionKey {
        match self {
            Self::Activity(definition) => &definition.key,
            Self::Workflow(definition) => &definition.key,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Activity(_) => DefinitionKind::Activity,
            Self::Workflow(_) => DefinitionKind::Workflow,
        }
    }

    pub fn as_activity(&self) -> Option<&ActivityDefinition> {
        match self {
            Self::Activity(definition) => Some(definition),
            Self::Workflow(_) => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowDefinition> {
        match self {
            Self::Workflow(definition) => Some(definition),
            Self::Activity(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_millis_means_no_timeout() {
        assert_eq!(Timeout::from_millis(0), Timeout::None);
        assert_eq!(
            Timeout::from_millis(250),
            Timeout::After(Duration::from_millis(250))
        );
        assert!(!Timeout::None.is_exceeded_by(Duration::from_secs(u32::MAX as u64)));
        assert!(Timeout::from_millis(10).is_exceeded_by(Duration::from_millis(10)));
    }

    #[test]
    fn test_registered_definition_serializes_with_kind_tag() {
        let definition = RegisteredDefinition::Activity(ActivityDefinition {
            key: DefinitionKey::new("get_contact_activity", "1"),
            options: ActivityOptions {
                timeouts: ActivityTimeouts::default(),
                default_task_list: "registration-activities".to_string(),
                description: None,
            },
        });

        let json = serde_json::to_value(&definition).unwrap();
        assert_eq!(json["kind"], "activity");

        let parsed: RegisteredDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, definition);
        assert_eq!(parsed.kind(), DefinitionKind::Activity);
    }

    #[test]
    fn test_child_policy_round_trips_through_strings() {
        for policy in [
            ChildPolicy::Terminate,
            ChildPolicy::RequestCancel,
            ChildPolicy::Abandon,
        ] {
            assert_eq!(policy.to_string().parse::<ChildPolicy>().unwrap(), policy);
        }
        assert!("explode".parse::<ChildPolicy>().is_err());
    }
}
