//! Parameters accepted by training and generation jobs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StudioError;

/// Upper bound on epochs accepted for a single training job.
pub const MAX_EPOCHS: u32 = 1000;

/// Hyper-parameters for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    /// Seed for the metric jitter; random when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            seed: None,
        }
    }
}

/// A training job: hyper-parameters plus references to the training inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingRequest {
    #[serde(flatten)]
    pub config: TrainingConfig,
    /// Opaque references to uploaded training inputs.
    #[serde(default)]
    pub samples: Vec<String>,
}

impl TrainingRequest {
    pub fn new(samples: Vec<String>, epochs: u32) -> Self {
        Self {
            config: TrainingConfig {
                epochs,
                ..TrainingConfig::default()
            },
            samples,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), StudioError> {
        let config = &self.config;
        if config.epochs == 0 {
            return Err(StudioError::invalid_config("epochs must be greater than zero"));
        }
        if config.epochs > MAX_EPOCHS {
            return Err(StudioError::invalid_config(format!(
                "epochs must be at most {MAX_EPOCHS}, got {}",
                config.epochs
            )));
        }
        if config.batch_size == 0 {
            return Err(StudioError::invalid_config("batch_size must be greater than zero"));
        }
        if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
            return Err(StudioError::invalid_config("learning_rate must be a positive number"));
        }
        if self.samples.is_empty() {
            return Err(StudioError::invalid_config("training data is required"));
        }
        Ok(())
    }
}

/// Output frame size, written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            StudioError::invalid_config(format!(
                "invalid resolution '{s}', expected WIDTHxHEIGHT"
            ))
        };

        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A generation job: prompt plus output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Artifact length in seconds.
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_duration() -> f64 {
    5.0
}

fn default_resolution() -> String {
    "512x512".to_string()
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_fps() -> u32 {
    30
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            duration: default_duration(),
            resolution: default_resolution(),
            format: default_format(),
            fps: default_fps(),
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Validate the request and return the parsed resolution.
    pub fn validate(&self) -> Result<Resolution, StudioError> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::invalid_config("prompt is required"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(StudioError::invalid_config(
                "duration must be a positive number of seconds",
            ));
        }
        if self.fps == 0 {
            return Err(StudioError::invalid_config("fps must be greater than zero"));
        }
        if self.format.trim().is_empty() {
            return Err(StudioError::invalid_config("format must not be empty"));
        }
        self.resolution.parse()
    }

    /// Total frames in the requested artifact.
    pub fn frame_count(&self) -> u64 {
        (self.duration * f64::from(self.fps)).round() as u64
    }
}
