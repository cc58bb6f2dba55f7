use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors raised while loading or validating [`ControllerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControllerConfig {
    #[serde(default)]
    pub controller: ReconcileSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.concurrent_reconciles == 0 {
            return Err(ConfigError::Validation(
                "controller.concurrent_reconciles must be > 0".into(),
            ));
        }
        if c.delete_requeue_after_secs == 0 || c.normal_requeue_after_secs == 0 {
            return Err(ConfigError::Validation(
                "controller requeue delays must be > 0".into(),
            ));
        }
        if c.reconcile_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "controller.reconcile_timeout_secs must be > 0 when set".into(),
            ));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Tuning of the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Upper bound of reconciliations running at the same time.
    #[serde(default = "default_concurrent_reconciles")]
    pub concurrent_reconciles: usize,
    /// Delay before retrying a deletion whose undeploy failed.
    #[serde(default = "default_requeue_after_secs")]
    pub delete_requeue_after_secs: u64,
    /// Delay before retrying a pass where some feature failed.
    #[serde(default = "default_requeue_after_secs")]
    pub normal_requeue_after_secs: u64,
    /// Optional deadline for one pass, checked between features.
    #[serde(default)]
    pub reconcile_timeout_secs: Option<u64>,
    /// How many times a conflicting status write is retried with a fresh read.
    #[serde(default = "default_status_write_retries")]
    pub status_write_retries: u32,
}

fn default_concurrent_reconciles() -> usize {
    10
}
fn default_requeue_after_secs() -> u64 {
    20
}
fn default_status_write_retries() -> u32 {
    3
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            concurrent_reconciles: default_concurrent_reconciles(),
            delete_requeue_after_secs: default_requeue_after_secs(),
            normal_requeue_after_secs: default_requeue_after_secs(),
            reconcile_timeout_secs: None,
            status_write_retries: default_status_write_retries(),
        }
    }
}

impl ReconcileSettings {
    pub fn delete_requeue_after(&self) -> Duration {
        Duration::from_secs(self.delete_requeue_after_secs)
    }

    pub fn normal_requeue_after(&self) -> Duration {
        Duration::from_secs(self.normal_requeue_after_secs)
    }

    pub fn reconcile_timeout(&self) -> Option<Duration> {
        self.reconcile_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{ConfigError, ControllerConfig};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "featurebundle.toml";

    pub fn load_config(path: Option<&str>) -> Result<ControllerConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., FEATUREBUNDLE__CONTROLLER__CONCURRENT_RECONCILES=4
        builder = builder.add_source(
            Environment::with_prefix("FEATUREBUNDLE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Parse(format!("config build error: {e}")))?;
        let merged: ControllerConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<ControllerConfig, ConfigError> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
