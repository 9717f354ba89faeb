//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones
//! winning:
//!
//! 1. built-in defaults
//! 2. `config/regflow.yaml`
//! 3. `config/regflow.{environment}.yaml`
//! 4. environment variables `REGFLOW__SECTION__KEY`
//! 5. explicit overrides (tests)

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::WorkflowConfig;
use crate::constants::{
    CONFIG_FILE_STEM, ENVIRONMENT_VAR, ENV_OVERRIDE_PREFIX, ENV_OVERRIDE_SEPARATOR,
};

/// Environment variable pointing at a non-default config directory
const CONFIG_DIR_VAR: &str = "REGFLOW_CONFIG_DIR";

#[derive(Debug)]
pub struct ConfigManager {
    config: WorkflowConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, HashMap::new())
    }

    /// Load with dotted-key overrides (`"worker.max_concurrent_tasks" => "8"`)
    /// applied after every other source
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment, overrides)?;
        config.validate()?;

        info!(
            environment = %environment,
            domain = %config.domain,
            task_list = %config.task_list,
            backend = ?config.orchestrator.backend,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: WorkflowConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Files the loader reads for an environment, in layering order
    pub fn config_files(config_directory: &Path, environment: &str) -> [PathBuf; 2] {
        [
            config_directory.join(format!("{CONFIG_FILE_STEM}.yaml")),
            config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml")),
        ]
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        overrides: HashMap<String, String>,
    ) -> ConfigResult<WorkflowConfig> {
        let load_error = |e: config::ConfigError| ConfigurationError::load_error(environment, e);

        let defaults = config::Config::try_from(&WorkflowConfig::default()).map_err(load_error)?;
        let mut builder = config::Config::builder().add_source(defaults);

        for path in Self::config_files(config_directory, environment) {
            if path.is_file() {
                debug!(file = %path.display(), "Adding configuration file");
                builder = builder.add_source(config::File::from(path).required(true));
            } else {
                debug!(file = %path.display(), "Configuration file not present, skipping");
            }
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .prefix_separator(ENV_OVERRIDE_SEPARATOR)
                    .separator(ENV_OVERRIDE_SEPARATOR)
                    .try_parsing(true),
            )
            .set_override("environment", environment)
            .map_err(load_error)?;

        for (key, value) in overrides {
            builder = builder.set_override(key, value).map_err(load_error)?;
        }

        builder
            .build()
            .and_then(|merged| merged.try_deserialize::<WorkflowConfig>())
            .map_err(load_error)
    }

    /// Environment name from `REGFLOW_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VAR)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var(CONFIG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, PipelineVariant};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().environment, "test");
        assert_eq!(manager.config().task_list, "registration");
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "regflow.yaml",
            "domain: BaseDomain\ntask_list: base\nworker:\n  max_concurrent_tasks: 2\n",
        );
        write(
            &dir,
            "regflow.test.yaml",
            "task_list: tested\npipeline_variant: fan_out\nconfirmation:\n  poll_interval_ms: 10\n",
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();
        assert_eq!(config.domain, "BaseDomain");
        assert_eq!(config.task_list, "tested");
        assert_eq!(config.worker.max_concurrent_tasks, 2);
        assert_eq!(config.pipeline_variant, PipelineVariant::FanOut);
        assert_eq!(config.confirmation.poll_interval_ms, 10);
        // Untouched keys inside a partially overridden section keep defaults
        assert_eq!(config.confirmation.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let dir = TempDir::new().unwrap();
        write(&dir, "regflow.yaml", "worker:\n  max_concurrent_tasks: 2\n");

        let overrides = HashMap::from([
            ("worker.max_concurrent_tasks".to_string(), "8".to_string()),
            ("orchestrator.backend".to_string(), "postgres".to_string()),
            (
                "orchestrator.database_url".to_string(),
                "postgres://localhost/regflow".to_string(),
            ),
        ]);
        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "development",
            overrides,
        )
        .unwrap();
        assert_eq!(manager.config().worker.max_concurrent_tasks, 8);
        assert_eq!(manager.config().orchestrator.backend, BackendKind::Postgres);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "regflow.yaml", "worker:\n  max_concurrent_tasks: 0\n");
        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_yaml_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "regflow.yaml", "worker: [unclosed\n");
        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
    }
}
