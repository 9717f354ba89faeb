#![allow(dead_code)] // Each test binary uses a different subset of the helpers

pub mod builders;
pub mod harness;
pub mod strategies;

pub use builders::*;
pub use harness::*;

use registration_workflow::config::{ActivityOverride, WorkflowConfig};
use registration_workflow::constants::activity_names;
use std::collections::HashMap;

/// A workflow id no other test uses
pub fn unique_workflow_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Configuration with millisecond timeouts so executions close quickly
pub fn test_config() -> WorkflowConfig {
    let mut config = WorkflowConfig {
        environment: "test".to_string(),
        domain: "RegflowTestDomain".to_string(),
        ..WorkflowConfig::default()
    };

    config.orchestrator.poll_timeout_ms = 100;
    config.orchestrator.timer_resolution_ms = 10;
    config.workflow.execution_timeout_ms = 20_000;
    config.workflow.decision_timeout_ms = 500;

    config.activities.defaults.schedule_to_start_timeout_ms = 5_000;
    config.activities.defaults.start_to_close_timeout_ms = 10_000;
    config.activities.defaults.schedule_to_close_timeout_ms = 15_000;
    config.activities.defaults.heartbeat_timeout_ms = 0;
    config.activities.overrides = HashMap::new();
    for name in [
        activity_names::WAIT_FOR_CONFIRMATION,
        activity_names::CONFIRM_EMAIL,
        activity_names::CONFIRM_SMS,
    ] {
        config
            .activities
            .overrides
            .insert(name.to_string(), ActivityOverride::heartbeat(2_000));
    }

    config.worker.shutdown_grace_ms = 200;
    config.worker.poll_error_backoff_ms = 20;
    config.coordinator.poll_error_backoff_ms = 20;
    config.confirmation.poll_interval_ms = 10;
    config.confirmation.heartbeat_interval_ms = 50;
    config.confirmation.max_wait_ms = 5_000;
    config
}
