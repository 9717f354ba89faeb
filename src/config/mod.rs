//! # Registration Workflow Configuration
//!
//! Explicit configuration passed into every constructor. Values come from
//! layered YAML files plus environment overrides (see [`ConfigManager`]);
//! every section has defaults so a missing key never aborts startup.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use registration_workflow::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//! println!("{} polls {}", config.worker.identity, config.activity_task_list());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{activity_names, MAX_DISPLAY_NAME_LENGTH};
use crate::models::{ActivityOptions, ActivityTimeouts, ChildPolicy, Timeout, WorkflowOptions};

/// Which pipeline shape the workflow runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// contact -> subscribe -> wait for confirmation -> send result
    #[default]
    Sequential,
    /// contact -> subscribe -> ANY(confirm email, confirm sms) -> send result
    FanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    Postgres,
}

/// Root configuration structure mirroring `config/regflow.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub environment: String,
    pub domain: String,
    /// Decision task list; activities use `"{task_list}-activities"`
    pub task_list: String,
    pub workflow_name: String,
    pub pipeline_variant: PipelineVariant,
    pub orchestrator: OrchestratorConfig,
    pub workflow: WorkflowSettings,
    pub activities: ActivitiesConfig,
    pub worker: WorkerConfig,
    pub coordinator: CoordinatorConfig,
    pub contact: ContactConfig,
    pub confirmation: ConfirmationConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            domain: "SWFSampleDomain".to_string(),
            task_list: "registration".to_string(),
            workflow_name: "swf-sns-workflow".to_string(),
            pipeline_variant: PipelineVariant::default(),
            orchestrator: OrchestratorConfig::default(),
            workflow: WorkflowSettings::default(),
            activities: ActivitiesConfig::default(),
            worker: WorkerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            contact: ContactConfig::default(),
            confirmation: ConfirmationConfig::default(),
            notification: NotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub backend: BackendKind,
    pub poll_timeout_ms: u64,
    /// Timeout sweep cadence; also the PostgreSQL claim interval
    pub timer_resolution_ms: u64,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub retention_days: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            poll_timeout_ms: 60_000,
            timer_resolution_ms: 50,
            database_url: None,
            max_connections: 10,
            retention_days: 1,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn timer_resolution(&self) -> Duration {
        Duration::from_millis(self.timer_resolution_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub child_policy: ChildPolicy,
    pub execution_timeout_ms: u64,
    pub decision_timeout_ms: u64,
    pub description: Option<String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            child_policy: ChildPolicy::Terminate,
            execution_timeout_ms: 24 * 3_600_000,
            decision_timeout_ms: 60_000,
            description: None,
        }
    }
}

/// Activity timeouts in milliseconds; 0 means no timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityTimeoutConfig {
    pub schedule_to_start_timeout_ms: u64,
    pub start_to_close_timeout_ms: u64,
    pub schedule_to_close_timeout_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

impl Default for ActivityTimeoutConfig {
    fn default() -> Self {
        Self {
            schedule_to_start_timeout_ms: 120_000,
            start_to_close_timeout_ms: 3_600_000,
            schedule_to_close_timeout_ms: 3_800_000,
            heartbeat_timeout_ms: 0,
        }
    }
}

impl ActivityTimeoutConfig {
    pub fn timeouts(&self) -> ActivityTimeouts {
        ActivityTimeouts {
            schedule_to_start: Timeout::from_millis(self.schedule_to_start_timeout_ms),
            start_to_close: Timeout::from_millis(self.start_to_close_timeout_ms),
            schedule_to_close: Timeout::from_millis(self.schedule_to_close_timeout_ms),
            heartbeat: Timeout::from_millis(self.heartbeat_timeout_ms),
        }
    }
}

/// Per-activity adjustments on top of the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityOverride {
    pub schedule_to_start_timeout_ms: Option<u64>,
    pub start_to_close_timeout_ms: Option<u64>,
    pub schedule_to_close_timeout_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub description: Option<String>,
}

impl ActivityOverride {
    /// Override only the heartbeat timeout
    pub fn heartbeat(heartbeat_timeout_ms: u64) -> Self {
        Self {
            heartbeat_timeout_ms: Some(heartbeat_timeout_ms),
            ..Self::default()
        }
    }

    fn apply(&self, defaults: &ActivityTimeoutConfig) -> ActivityTimeoutConfig {
        ActivityTimeoutConfig {
            schedule_to_start_timeout_ms: self
                .schedule_to_start_timeout_ms
                .unwrap_or(defaults.schedule_to_start_timeout_ms),
            start_to_close_timeout_ms: self
                .start_to_close_timeout_ms
                .unwrap_or(defaults.start_to_close_timeout_ms),
            schedule_to_close_timeout_ms: self
                .schedule_to_close_timeout_ms
                .unwrap_or(defaults.schedule_to_close_timeout_ms),
            heartbeat_timeout_ms: self
                .heartbeat_timeout_ms
                .unwrap_or(defaults.heartbeat_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitiesConfig {
    pub defaults: ActivityTimeoutConfig,
    pub overrides: HashMap<String, ActivityOverride>,
}

impl Default for ActivitiesConfig {
    fn default() -> Self {
        // Confirmation waits heartbeat, so they get a heartbeat timeout
        let overrides = [
            activity_names::WAIT_FOR_CONFIRMATION,
            activity_names::CONFIRM_EMAIL,
            activity_names::CONFIRM_SMS,
        ]
        .into_iter()
        .map(|name| (name.to_string(), ActivityOverride::heartbeat(900_000)))
        .collect();

        Self {
            defaults: ActivityTimeoutConfig::default(),
            overrides,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub identity: String,
    pub max_concurrent_tasks: usize,
    pub shutdown_grace_ms: u64,
    pub poll_error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            identity: "regflow-worker".to_string(),
            max_concurrent_tasks: 4,
            shutdown_grace_ms: 10_000,
            poll_error_backoff_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub identity: String,
    pub poll_error_backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            identity: "regflow-decider".to_string(),
            poll_error_backoff_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    pub max_prompt_attempts: u32,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            max_prompt_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Give up after this long even if confirmations are still pending; 0 waits forever
    pub max_wait_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4_000,
            heartbeat_interval_ms: 30_000,
            max_wait_ms: 3_000_000,
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_ms > 0).then(|| Duration::from_millis(self.max_wait_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub topic_prefix: String,
    /// SMS shows only the first 10 characters
    pub display_name: String,
    pub success_subject: String,
    pub success_message: String,
    pub delete_topic_on_completion: bool,
    /// In-memory notifier only: confirm pending subscriptions after this delay
    pub auto_confirm_after_ms: Option<u64>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "SWF_Sample_Topic".to_string(),
            display_name: "SWFSample".to_string(),
            success_subject: "Subscription confirmed".to_string(),
            success_message: "Thanks for confirming your subscription!".to_string(),
            delete_topic_on_completion: false,
            auto_confirm_after_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Falls back to an environment-based level when unset
    pub level: Option<String>,
    pub file_output: bool,
    pub directory: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            file_output: false,
            directory: "log".to_string(),
            json: true,
        }
    }
}

impl WorkflowConfig {
    /// Task list activity workers poll
    pub fn activity_task_list(&self) -> String {
        format!("{}-activities", self.task_list)
    }

    /// Registration options for one activity: defaults plus its override
    pub fn activity_options(&self, name: &str) -> ActivityOptions {
        let activity_override = self.activities.overrides.get(name);
        let timeouts = activity_override
            .map(|o| o.apply(&self.activities.defaults))
            .unwrap_or_else(|| self.activities.defaults.clone())
            .timeouts();
        let description = activity_override
            .and_then(|o| o.description.clone())
            .or_else(|| Some(format!("{} {name}", self.domain)));

        ActivityOptions {
            timeouts,
            default_task_list: self.activity_task_list(),
            description,
        }
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            child_policy: self.workflow.child_policy,
            execution_start_to_close: Duration::from_millis(self.workflow.execution_timeout_ms),
            task_start_to_close: Duration::from_millis(self.workflow.decision_timeout_ms),
            default_task_list: self.task_list.clone(),
            description: self
                .workflow
                .description
                .clone()
                .or_else(|| Some(format!("{} registration workflow", self.domain))),
        }
    }

    /// Reject configurations the system cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("domain", &self.domain),
            ("task_list", &self.task_list),
            ("workflow_name", &self.workflow_name),
            ("worker.identity", &self.worker.identity),
            ("coordinator.identity", &self.coordinator.identity),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "workflow configuration",
                ));
            }
        }

        if self.worker.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_concurrent_tasks",
                0,
                "must be greater than 0",
            ));
        }

        for (field, value) in [
            ("orchestrator.poll_timeout_ms", self.orchestrator.poll_timeout_ms),
            ("orchestrator.timer_resolution_ms", self.orchestrator.timer_resolution_ms),
            ("confirmation.poll_interval_ms", self.confirmation.poll_interval_ms),
            ("confirmation.heartbeat_interval_ms", self.confirmation.heartbeat_interval_ms),
            ("workflow.execution_timeout_ms", self.workflow.execution_timeout_ms),
            ("workflow.decision_timeout_ms", self.workflow.decision_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "interval must be greater than 0",
                ));
            }
        }

        if self.contact.max_prompt_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "contact.max_prompt_attempts",
                0,
                "must be greater than 0",
            ));
        }

        if self.notification.display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(ConfigurationError::invalid_value(
                "notification.display_name",
                &self.notification.display_name,
                format!("must be at most {MAX_DISPLAY_NAME_LENGTH} characters"),
            ));
        }

        if self.orchestrator.backend == BackendKind::Postgres
            && self.orchestrator.database_url.is_none()
        {
            return Err(ConfigurationError::missing_required_field(
                "orchestrator.database_url",
                "postgres backend",
            ));
        }

        Ok(())
    }
}
