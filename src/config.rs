use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "docflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for every environment variable read by `EngineConfig::from_env`.
const ENV_PREFIX: &str = "DOCFLOW_";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "docflow=info,docflow_lib=info,tower_http=warn"
}

/// Get the application data directory (`<data dir>/docflow`).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default database location.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("docflow.db")
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be {expected}")]
    OutOfRange { key: String, expected: String },
}

/// Engine configuration. Every option has a default; `from_env` overrides
/// selected fields from `DOCFLOW_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows kept per table at persistence time.
    pub storage_ceiling: usize,
    /// Rows returned on any read path unless the caller asks for fewer.
    pub response_ceiling: usize,
    /// Rows embedded in lightweight previews and task results.
    pub preview_ceiling: usize,
    /// Recognized regions below this confidence are discarded.
    pub recognition_confidence_threshold: f32,
    /// Fast pass finalizes when native coverage reaches this ratio.
    pub text_coverage_threshold: f32,
    /// Terminal task records older than this are removed by cleanup.
    pub task_retention_window: Duration,
    /// A task still `PROCESSING` after this long is declared failed.
    pub max_task_runtime: Duration,
    pub recognition_workers: usize,
    pub enhancement_workers: usize,
    /// Distributed broker. `None` selects the in-process backend.
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub backend_probe_timeout: Duration,
    pub database_path: PathBuf,
    pub bind_address: String,
    /// How often the maintenance sweeper expires and cleans up tasks.
    pub sweep_interval: Duration,
    /// Tesseract binary; `None` means `tesseract` on the PATH and `"off"`
    /// disables recognition.
    pub recognition_command: Option<String>,
    pub recognition_languages: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_ceiling: 10_000,
            response_ceiling: 100,
            preview_ceiling: 50,
            recognition_confidence_threshold: 0.1,
            text_coverage_threshold: 0.9,
            task_retention_window: Duration::from_secs(3600),
            max_task_runtime: Duration::from_secs(300),
            recognition_workers: 2,
            enhancement_workers: 4,
            redis_url: None,
            redis_key_prefix: APP_NAME.to_string(),
            backend_probe_timeout: Duration::from_secs(2),
            database_path: default_database_path(),
            bind_address: "127.0.0.1:8000".to_string(),
            sweep_interval: Duration::from_secs(30),
            recognition_command: None,
            recognition_languages: "eng".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = get("STORAGE_CEILING") {
            config.storage_ceiling = parse("STORAGE_CEILING", &v)?;
        }
        if let Some(v) = get("RESPONSE_CEILING") {
            config.response_ceiling = parse("RESPONSE_CEILING", &v)?;
        }
        if let Some(v) = get("PREVIEW_CEILING") {
            config.preview_ceiling = parse("PREVIEW_CEILING", &v)?;
        }
        if let Some(v) = get("RECOGNITION_CONFIDENCE_THRESHOLD") {
            config.recognition_confidence_threshold =
                parse("RECOGNITION_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("TEXT_COVERAGE_THRESHOLD") {
            config.text_coverage_threshold = parse("TEXT_COVERAGE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("TASK_RETENTION_SECS") {
            config.task_retention_window =
                Duration::from_secs(parse("TASK_RETENTION_SECS", &v)?);
        }
        if let Some(v) = get("MAX_TASK_RUNTIME_SECS") {
            config.max_task_runtime = Duration::from_secs(parse("MAX_TASK_RUNTIME_SECS", &v)?);
        }
        if let Some(v) = get("RECOGNITION_WORKERS") {
            config.recognition_workers = parse("RECOGNITION_WORKERS", &v)?;
        }
        if let Some(v) = get("ENHANCEMENT_WORKERS") {
            config.enhancement_workers = parse("ENHANCEMENT_WORKERS", &v)?;
        }
        if let Some(v) = get("REDIS_URL") {
            let v = v.trim().to_string();
            config.redis_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("REDIS_KEY_PREFIX") {
            config.redis_key_prefix = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("BIND_ADDRESS") {
            config.bind_address = v;
        }
        if let Some(v) = get("SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(parse("SWEEP_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("RECOGNITION_COMMAND") {
            let v = v.trim().to_string();
            config.recognition_command = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("RECOGNITION_LANGUAGES") {
            config.recognition_languages = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("storage_ceiling", self.storage_ceiling)?;
        positive("response_ceiling", self.response_ceiling)?;
        positive("recognition_workers", self.recognition_workers)?;
        positive("enhancement_workers", self.enhancement_workers)?;
        unit_interval(
            "recognition_confidence_threshold",
            self.recognition_confidence_threshold,
        )?;
        unit_interval("text_coverage_threshold", self.text_coverage_threshold)?;
        if self.max_task_runtime.is_zero() {
            return Err(out_of_range("max_task_runtime", "greater than zero"));
        }
        if self.task_retention_window.is_zero() {
            return Err(out_of_range("task_retention_window", "greater than zero"));
        }
        if self.sweep_interval.is_zero() {
            return Err(out_of_range("sweep_interval", "greater than zero"));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
        })
}

fn positive(key: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(out_of_range(key, "greater than zero"));
    }
    Ok(())
}

fn unit_interval(key: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(out_of_range(key, "between 0.0 and 1.0"));
    }
    Ok(())
}

fn out_of_range(key: &str, expected: &str) -> ConfigError {
    ConfigError::OutOfRange {
        key: key.to_string(),
        expected: expected.to_string(),
    }
}
