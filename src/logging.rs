//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to a
//! JSON log file, for following deciders and workers across processes.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::constants::ENVIRONMENT_VAR;

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging; later calls are no-ops
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level))
        };

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(filter());

        let (file, guard, log_path) = if config.file_output {
            match file_layer(config, &environment, filter()) {
                Some((layer, guard, path)) => (Some(layer), Some(guard), Some(path)),
                None => (None, None, None),
            }
        } else {
            (None, None, None)
        };

        let subscriber = tracing_subscriber::registry().with(console).with(file);

        // Another subscriber (e.g. a test harness) may already be installed
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = log_path.as_ref().map(|p| p.display().to_string()),
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

/// Non-blocking file layer writing `{environment}.{pid}.{timestamp}.log` under
/// `config.directory`; `None` when the directory cannot be created
fn file_layer<S>(
    config: &LoggingConfig,
    environment: &str,
    filter: EnvFilter,
) -> Option<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard, PathBuf)>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let log_dir = PathBuf::from(&config.directory);
    if let Err(err) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "Failed to create log directory {}: {err}",
            log_dir.display()
        );
        return None;
    }

    let pid = process::id();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{environment}.{pid}.{timestamp}.log");
    let log_path = log_dir.join(&log_filename);

    let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false);
    let layer = if config.json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    };
    Some((layer, guard, log_path))
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var(ENVIRONMENT_VAR)
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for definition registration
pub fn log_registration_operation(
    operation: &str,
    domain: &str,
    kind: &str,
    name: &str,
    version: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        domain = %domain,
        kind = %kind,
        name = %name,
        version = %version,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 REGISTRATION_OPERATION"
    );
}

/// Log structured data for one decision task
pub fn log_decision_cycle(
    workflow_id: &str,
    run_id: &str,
    new_events: usize,
    decisions: &[&str],
    state: &str,
    cursor: usize,
) {
    tracing::info!(
        workflow_id = %workflow_id,
        run_id = %run_id,
        new_events = new_events,
        decisions = ?decisions,
        state = %state,
        cursor = cursor,
        timestamp = %Utc::now().to_rfc3339(),
        "🧭 DECISION_CYCLE"
    );
}

/// Log structured data for an activity dispatch outcome
pub fn log_activity_dispatch(
    activity: &str,
    activity_id: &str,
    workflow_id: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        activity = %activity,
        activity_id = %activity_id,
        workflow_id = %workflow_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 ACTIVITY_DISPATCH"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig {
            level: Some("warn".to_string()),
            file_output: false,
            ..LoggingConfig::default()
        };
        init_structured_logging(&config);
        init_structured_logging(&config);
        assert!(LOGGER_INITIALIZED.get().is_some());
    }

    #[test]
    fn test_file_layer_writes_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            level: Some("info".to_string()),
            file_output: true,
            directory: dir.path().join("logs").display().to_string(),
            json: true,
        };

        let (layer, guard, path) =
            file_layer::<tracing_subscriber::Registry>(&config, "test", EnvFilter::new("info"))
                .expect("file layer");
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(workflow_id = "wf-log", "decision recorded");
        });
        drop(guard);

        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("test."));
        let contents = fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().expect("one log line");
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["fields"]["message"], "decision recorded");
        assert_eq!(event["fields"]["workflow_id"], "wf-log");
    }

    #[test]
    fn test_init_with_file_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            level: Some("info".to_string()),
            file_output: true,
            directory: dir.path().display().to_string(),
            json: false,
        };
        init_structured_logging(&config);
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
