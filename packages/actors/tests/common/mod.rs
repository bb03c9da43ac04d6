#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{
    Broadcaster, GenerationRunner, JobScheduler, ModelRegistry, RunnerRegistry, SchedulerArgs,
    SchedulerConfig, TrainingRunner, start_model_registry, start_scheduler,
};
use studio_core::{JobId, JobUpdate, Model, ModelConfig, ModelKind};
use tokio::sync::broadcast;

pub const EPOCH_DELAY: Duration = Duration::from_millis(5);
pub const STEP_DELAY: Duration = Duration::from_millis(2);

/// Upper bound for any single test to finish its jobs.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Harness {
    pub models: ModelRegistry,
    pub scheduler: JobScheduler,
    pub broadcaster: Arc<Broadcaster>,
}

impl Harness {
    pub async fn model(&self) -> Result<Model, Box<dyn Error>> {
        Ok(self.models.create(ModelKind::TextToVideo, ModelConfig::new()).await?)
    }
}

pub fn fast_runners() -> RunnerRegistry {
    RunnerRegistry::new()
        .with(TrainingRunner::new(EPOCH_DELAY))
        .with(GenerationRunner::new(STEP_DELAY))
}

pub async fn start() -> Result<Harness, Box<dyn Error>> {
    start_with(fast_runners(), SchedulerConfig::default()).await
}

pub async fn start_with(
    runners: RunnerRegistry,
    config: SchedulerConfig,
) -> Result<Harness, Box<dyn Error>> {
    let broadcaster = Arc::new(Broadcaster::new());
    let (models, _) = start_model_registry().await?;
    let (scheduler, _) = start_scheduler(SchedulerArgs {
        registry: models.clone(),
        runners,
        broadcaster: broadcaster.clone(),
        config,
    })
    .await?;
    Ok(Harness {
        models,
        scheduler,
        broadcaster,
    })
}

/// Ten opaque sample references.
pub fn samples() -> Vec<String> {
    (0..10).map(|i| format!("sample-{i}.mp4")).collect()
}

/// Read the firehose until `job_id` finishes, returning its updates in order.
pub async fn updates_until_done(
    rx: &mut broadcast::Receiver<JobUpdate>,
    job_id: JobId,
) -> Result<Vec<JobUpdate>, Box<dyn Error>> {
    let collect = async {
        let mut updates = Vec::new();
        loop {
            let update = rx.recv().await?;
            if update.job_id != job_id {
                continue;
            }
            let done = update.is_terminal();
            updates.push(update);
            if done {
                return Ok::<_, broadcast::error::RecvError>(updates);
            }
        }
    };
    Ok(tokio::time::timeout(TEST_TIMEOUT, collect).await??)
}
