//! Model domain types owned by the model registry.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque key/value model configuration.
pub type ModelConfig = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub Ulid);

impl ModelId {
    /// Create a new unique model ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a model ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a model consumes and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    TextToVideo,
    ImageToVideo,
    TextToAudio,
    AudioProcessing,
    TextToImage,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::TextToVideo => "text-to-video",
            ModelKind::ImageToVideo => "image-to-video",
            ModelKind::TextToAudio => "text-to-audio",
            ModelKind::AudioProcessing => "audio-processing",
            ModelKind::TextToImage => "text-to-image",
        }
    }

    /// Parse the kebab-case name used on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text-to-video" => Some(ModelKind::TextToVideo),
            "image-to-video" => Some(ModelKind::ImageToVideo),
            "text-to-audio" => Some(ModelKind::TextToAudio),
            "audio-processing" => Some(ModelKind::AudioProcessing),
            "text-to-image" => Some(ModelKind::TextToImage),
            _ => None,
        }
    }

    /// Default `(layers, hidden_units)` shape for this kind.
    fn default_shape(&self) -> (u64, u64) {
        match self {
            ModelKind::TextToVideo => (6, 384),
            ModelKind::ImageToVideo => (5, 352),
            ModelKind::TextToAudio => (4, 256),
            ModelKind::AudioProcessing => (3, 256),
            ModelKind::TextToImage => (6, 320),
        }
    }

    /// Parameter count for a model of this kind with the given config.
    ///
    /// An explicit `parameters` key wins; otherwise the count is derived from
    /// `layers` and `hidden_units`, falling back to the kind's default shape.
    pub fn parameter_count(&self, config: &ModelConfig) -> u64 {
        if let Some(explicit) = config.get("parameters").and_then(|v| v.as_u64()) {
            return explicit;
        }

        let (default_layers, default_hidden) = self.default_shape();
        let layers = config
            .get("layers")
            .and_then(|v| v.as_u64())
            .filter(|v| *v > 0)
            .unwrap_or(default_layers);
        let hidden = config
            .get("hidden_units")
            .and_then(|v| v.as_u64())
            .filter(|v| *v > 0)
            .unwrap_or(default_hidden);

        // Weights and biases of `layers` square dense blocks.
        layers.saturating_mul(hidden.saturating_mul(hidden).saturating_add(hidden))
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final metrics recorded when a training run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub epochs: u32,
}

/// A registered model and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub kind: ModelKind,
    #[serde(default)]
    pub config: ModelConfig,
    pub parameters: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub trained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

impl Model {
    /// Create a new, untrained model.
    pub fn new(kind: ModelKind, config: ModelConfig) -> Self {
        Self {
            id: ModelId::new(),
            kind,
            parameters: kind.parameter_count(&config),
            config,
            created_at: Utc::now(),
            trained: false,
            metrics: None,
            trained_at: None,
            storage_path: None,
        }
    }

    /// Record the outcome of a finished training run.
    pub fn mark_trained(&mut self, metrics: TrainingMetrics) {
        self.trained = true;
        self.metrics = Some(metrics);
        self.trained_at = Some(Utc::now());
    }
}
