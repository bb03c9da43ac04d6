//! Generation route.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use studio_core::{ArtifactDescriptor, GenerationRequest, JobOutput, JobSpec, JobStatus};

use crate::models::parse_model_id;
use crate::{ApiError, Studio};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl GenerateRequest {
    fn to_request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.prompt.clone());
        if let Some(style) = &self.style {
            request = request.with_style(style.clone());
        }
        if let Some(resolution) = &self.resolution {
            request = request.with_resolution(resolution.clone());
        }
        if let Some(duration) = self.duration {
            request = request.with_duration(duration);
        }
        if let Some(format) = &self.format {
            request.format = format.clone();
        }
        request
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub artifact: ArtifactDescriptor,
    /// Wall-clock milliseconds from submission to completion.
    pub processing_time: u64,
}

impl Studio {
    /// `POST /generation/generate`
    ///
    /// Runs a generation job and waits for its artifact. Without a `modelId`
    /// the oldest registered model is used.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ApiError> {
        let started = Instant::now();

        let model_id = match request.model_id.as_deref() {
            Some(id) => parse_model_id(id)?,
            None => self
                .models()
                .list()
                .await?
                .first()
                .map(|m| m.id)
                .ok_or(ApiError::NoModels)?,
        };

        let job = self
            .scheduler()
            .submit(JobSpec::generation(model_id, request.to_request()))
            .await?;
        tracing::info!(job_id = %job.id, model_id = %model_id, "Generation started");

        let finished = self.scheduler().wait(job.id).await?;
        match finished.status {
            JobStatus::Completed { result, .. } => match result.output {
                JobOutput::Generation(artifact) => Ok(GenerateResponse {
                    artifact,
                    processing_time: started.elapsed().as_millis() as u64,
                }),
                JobOutput::Training(_) => Err(ApiError::JobNotCompleted {
                    status: "completed",
                    message: "job produced no artifact".into(),
                }),
            },
            JobStatus::Failed { error, .. } => Err(ApiError::JobNotCompleted {
                status: "failed",
                message: error,
            }),
            JobStatus::Cancelled { reason, .. } => Err(ApiError::JobNotCompleted {
                status: "cancelled",
                message: reason.unwrap_or_else(|| "cancelled".into()),
            }),
            JobStatus::Queued | JobStatus::Running { .. } => Err(ApiError::JobNotCompleted {
                status: "unfinished",
                message: "job did not reach a terminal state".into(),
            }),
        }
    }
}
