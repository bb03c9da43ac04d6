//! Simulated training runner.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use studio_core::{
    JobKind, JobOutput, JobParams, ProgressEvent, StudioError, TrainingMetrics, TrainingRequest,
};

use crate::runner::{ProgressSink, RunContext, Runner, RunnerError, RunnerFuture};

/// Jitter is drawn from `[0, MAX_JITTER)`; keeping it below one epoch keeps
/// the curves strictly monotonic.
const MAX_JITTER: f64 = 0.9;

/// Runs `epochs` sequential epochs, reporting a decaying loss and a rising
/// accuracy after each one.
#[derive(Debug, Clone)]
pub struct TrainingRunner {
    epoch_delay: Duration,
}

impl TrainingRunner {
    pub fn new(epoch_delay: Duration) -> Self {
        Self { epoch_delay }
    }

    pub fn epoch_delay(&self) -> Duration {
        self.epoch_delay
    }
}

impl Default for TrainingRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

fn training_params(params: &JobParams) -> Result<&TrainingRequest, StudioError> {
    match params {
        JobParams::Training(request) => Ok(request),
        other => Err(StudioError::invalid_config(format!(
            "training runner cannot run {} jobs",
            other.kind()
        ))),
    }
}

/// Loss and accuracy after `epoch` of `total` with the given jitter.
fn epoch_metrics(epoch: u32, total: u32, jitter: f64) -> (f64, f64) {
    let t = f64::from(epoch - 1) + jitter;
    let loss = 2.0 * (-0.3 * t).exp();
    let accuracy = 0.5 + 0.45 * t / f64::from(total);
    (loss, accuracy)
}

impl Runner for TrainingRunner {
    fn kind(&self) -> JobKind {
        JobKind::Training
    }

    fn validate(&self, params: &JobParams) -> Result<(), StudioError> {
        training_params(params)?.validate()
    }

    fn estimate(&self, params: &JobParams) -> Duration {
        let epochs = training_params(params).map(|r| r.config.epochs).unwrap_or(0);
        self.epoch_delay * epochs
    }

    fn run(&self, ctx: RunContext, sink: ProgressSink) -> RunnerFuture {
        let delay = self.epoch_delay;
        Box::pin(async move {
            let request = training_params(&ctx.params)
                .map_err(|e| RunnerError::Failed(e.to_string()))?
                .clone();
            let total = request.config.epochs;
            let mut rng = StdRng::seed_from_u64(request.config.seed.unwrap_or_else(rand::random));

            tracing::debug!(
                job_id = %ctx.job_id,
                model_id = %ctx.model.id,
                epochs = total,
                samples = request.samples.len(),
                "Training started"
            );

            let mut last = None;
            for epoch in 1..=total {
                ctx.checkpoint()?;
                tokio::time::sleep(delay).await;

                let jitter = rng.random::<f64>() * MAX_JITTER;
                let (loss, accuracy) = epoch_metrics(epoch, total, jitter);
                sink.emit(ProgressEvent::training(ctx.job_id, epoch, total, loss, accuracy))
                    .await?;
                last = Some((loss, accuracy));
            }

            let (loss, accuracy) =
                last.ok_or_else(|| RunnerError::Failed("no epochs were run".into()))?;
            Ok(JobOutput::Training(TrainingMetrics {
                loss,
                accuracy,
                epochs: total,
            }))
        })
    }
}
