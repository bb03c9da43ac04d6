//! Simulated generation runner.

use std::time::Duration;

use chrono::Utc;
use studio_core::{
    ArtifactDescriptor, GenerationRequest, JobKind, JobOutput, JobParams, ProgressEvent,
    StudioError,
};

use crate::runner::{ProgressSink, RunContext, Runner, RunnerError, RunnerFuture};

/// Steps every generation walks through, in order.
pub const DEFAULT_STEPS: [&str; 7] = [
    "load model",
    "analyze prompt",
    "render keyframes",
    "interpolate frames",
    "apply motion",
    "encode",
    "finalize",
];

/// Walks a fixed list of named steps and describes the artifact it would
/// have produced.
#[derive(Debug, Clone)]
pub struct GenerationRunner {
    steps: Vec<String>,
    step_delay: Duration,
}

impl GenerationRunner {
    pub fn new(step_delay: Duration) -> Self {
        Self::with_steps(DEFAULT_STEPS.iter().map(|s| s.to_string()).collect(), step_delay)
    }

    pub fn with_steps(steps: Vec<String>, step_delay: Duration) -> Self {
        Self { steps, step_delay }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

impl Default for GenerationRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

fn generation_params(params: &JobParams) -> Result<&GenerationRequest, StudioError> {
    match params {
        JobParams::Generation(request) => Ok(request),
        other => Err(StudioError::invalid_config(format!(
            "generation runner cannot run {} jobs",
            other.kind()
        ))),
    }
}

impl Runner for GenerationRunner {
    fn kind(&self) -> JobKind {
        JobKind::Generation
    }

    fn validate(&self, params: &JobParams) -> Result<(), StudioError> {
        if self.steps.is_empty() {
            return Err(StudioError::invalid_config("generation needs at least one step"));
        }
        generation_params(params)?.validate().map(|_| ())
    }

    /// One `step_delay` per step; the request itself does not change pacing.
    fn estimate(&self, _params: &JobParams) -> Duration {
        self.step_delay * self.steps.len() as u32
    }

    fn run(&self, ctx: RunContext, sink: ProgressSink) -> RunnerFuture {
        let steps = self.steps.clone();
        let delay = self.step_delay;
        Box::pin(async move {
            let request = generation_params(&ctx.params)
                .map_err(|e| RunnerError::Failed(e.to_string()))?
                .clone();
            let resolution = request
                .validate()
                .map_err(|e| RunnerError::Failed(e.to_string()))?;
            let total = steps.len() as u32;

            for (index, name) in steps.iter().enumerate() {
                ctx.checkpoint()?;
                tokio::time::sleep(delay).await;
                let step = index as u32 + 1;
                sink.emit(ProgressEvent::generation(ctx.job_id, step, total, name.as_str()))
                    .await?;
            }

            let artifact = ArtifactDescriptor {
                width: resolution.width,
                height: resolution.height,
                duration: request.duration,
                fps: request.fps,
                frames: request.frame_count(),
                format: request.format.clone(),
                style: request.style.clone(),
                prompt: request.prompt.clone(),
                model_id: ctx.model.id,
                generated_at: Utc::now(),
            };
            tracing::debug!(
                job_id = %ctx.job_id,
                resolution = %resolution,
                frames = artifact.frames,
                "Artifact generated"
            );
            Ok(JobOutput::Generation(artifact))
        })
    }
}
