//! Studio startup and the facade every transport talks to.

use std::sync::Arc;

use actors::{
    Broadcaster, GenerationRunner, JobScheduler, ModelRegistry, RunnerRegistry, SchedulerArgs,
    TrainingRunner, start_model_registry, start_scheduler,
};
use studio_core::{ModelConfig, ModelKind, StudioError};

use crate::config::StudioConfig;

/// Errors raised while booting the studio.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to spawn actor: {0}")]
    Spawn(#[from] actors::SpawnErr),

    #[error(transparent)]
    Studio(#[from] StudioError),
}

/// Handle to a running studio.
///
/// Cheap to clone; every clone talks to the same actors.
#[derive(Clone)]
pub struct Studio {
    models: ModelRegistry,
    scheduler: JobScheduler,
    runners: RunnerRegistry,
    config: Arc<StudioConfig>,
}

impl Studio {
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn runners(&self) -> &RunnerRegistry {
        &self.runners
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    /// Stop the scheduler; unfinished jobs are cancelled.
    pub fn shutdown(&self) -> Result<(), StudioError> {
        tracing::info!("Shutting down studio");
        self.scheduler.shutdown()
    }
}

/// Runners for every job kind, paced by the config.
pub fn default_runners(config: &StudioConfig) -> RunnerRegistry {
    RunnerRegistry::new()
        .with(TrainingRunner::new(config.epoch_delay))
        .with(GenerationRunner::new(config.step_delay))
}

/// Boot the studio with the default runners.
pub async fn init_studio(config: StudioConfig) -> Result<Studio, InitError> {
    let runners = default_runners(&config);
    init_studio_with(config, runners).await
}

/// Boot the studio with a caller-provided set of runners.
///
/// Saved models under `model_dir` are restored first. When nothing was
/// restored and seeding is enabled, a default text-to-video model is
/// registered so generation works out of the box.
pub async fn init_studio_with(
    config: StudioConfig,
    runners: RunnerRegistry,
) -> Result<Studio, InitError> {
    tracing::info!(model_dir = ?config.model_dir, "Initializing studio...");

    let (models, _registry_handle) = start_model_registry().await?;
    let broadcaster = Arc::new(Broadcaster::new());
    let (scheduler, _scheduler_handle) = start_scheduler(SchedulerArgs {
        registry: models.clone(),
        runners: runners.clone(),
        broadcaster,
        config: config.scheduler_config(),
    })
    .await?;

    let restored = models.load_dir(&config.model_dir).await?;
    if restored == 0 && config.seed_model {
        let model = models
            .create(ModelKind::TextToVideo, ModelConfig::new())
            .await?;
        tracing::info!(model_id = %model.id, "Seeded default model");
    }

    tracing::info!(restored, "Studio initialized");
    Ok(Studio {
        models,
        scheduler,
        runners,
        config: Arc::new(config),
    })
}
