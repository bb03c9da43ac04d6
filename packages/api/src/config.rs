//! Studio configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use actors::{RetentionPolicy, SchedulerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid studio config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    /// Where models are saved and restored from.
    pub model_dir: PathBuf,
    /// Save each model into `model_dir` after it finishes training.
    pub autosave: bool,
    pub epoch_delay: Duration,
    pub step_delay: Duration,
    pub progress_buffer: usize,
    pub retention: RetentionPolicy,
    /// Register a default model when none could be restored.
    pub seed_model: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./data/models"),
            autosave: false,
            epoch_delay: Duration::from_millis(500),
            step_delay: Duration::from_millis(300),
            progress_buffer: 64,
            retention: RetentionPolicy::default(),
            seed_model: true,
        }
    }
}

impl StudioConfig {
    /// Build a config from environment variables.
    ///
    /// - `STUDIO_MODEL_DIR` (default: `./data/models`)
    /// - `STUDIO_AUTOSAVE` (`true`/`false`, default: false)
    /// - `STUDIO_EPOCH_DELAY_MS` (default: 500)
    /// - `STUDIO_STEP_DELAY_MS` (default: 300)
    /// - `STUDIO_PROGRESS_BUFFER` (default: 64, must be positive)
    /// - `STUDIO_JOB_RETENTION_SECS` (default: 3600)
    /// - `STUDIO_MAX_FINISHED_JOBS` (default: 1000)
    /// - `STUDIO_SWEEP_INTERVAL_SECS` (default: 30, 0 disables the sweep)
    /// - `STUDIO_SEED_MODEL` (`true`/`false`, default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).and_then(non_empty);

        let model_dir = var("STUDIO_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);
        let autosave = parse_bool("STUDIO_AUTOSAVE", var("STUDIO_AUTOSAVE"))?
            .unwrap_or(defaults.autosave);
        let seed_model = parse_bool("STUDIO_SEED_MODEL", var("STUDIO_SEED_MODEL"))?
            .unwrap_or(defaults.seed_model);

        let epoch_delay = parse_number("STUDIO_EPOCH_DELAY_MS", var("STUDIO_EPOCH_DELAY_MS"))?
            .map(Duration::from_millis)
            .unwrap_or(defaults.epoch_delay);
        let step_delay = parse_number("STUDIO_STEP_DELAY_MS", var("STUDIO_STEP_DELAY_MS"))?
            .map(Duration::from_millis)
            .unwrap_or(defaults.step_delay);

        let progress_buffer = parse_number("STUDIO_PROGRESS_BUFFER", var("STUDIO_PROGRESS_BUFFER"))?
            .map(|n| n as usize)
            .unwrap_or(defaults.progress_buffer);
        if progress_buffer == 0 {
            return Err(ConfigError::Invalid(
                "STUDIO_PROGRESS_BUFFER must be greater than zero".into(),
            ));
        }

        let retention = RetentionPolicy {
            max_age: parse_number("STUDIO_JOB_RETENTION_SECS", var("STUDIO_JOB_RETENTION_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention.max_age),
            max_finished: parse_number("STUDIO_MAX_FINISHED_JOBS", var("STUDIO_MAX_FINISHED_JOBS"))?
                .map(|n| n as usize)
                .unwrap_or(defaults.retention.max_finished),
            sweep_interval: parse_number(
                "STUDIO_SWEEP_INTERVAL_SECS",
                var("STUDIO_SWEEP_INTERVAL_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention.sweep_interval),
        };

        Ok(Self {
            model_dir,
            autosave,
            epoch_delay,
            step_delay,
            progress_buffer,
            retention,
            seed_model,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            progress_buffer: self.progress_buffer,
            retention: self.retention.clone(),
            autosave_dir: self.autosave.then(|| self.model_dir.clone()),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(var_name: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(v) = value else {
        return Ok(None);
    };
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid(format!(
            "invalid boolean for {var_name}={v} (expected true/false)"
        ))),
    }
}

fn parse_number(var_name: &str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "invalid number for {var_name}={v} (expected a non-negative integer)"
                ))
            })
        })
        .transpose()
}
