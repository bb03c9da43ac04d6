//! Training routes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use studio_core::{
    Job, JobId, JobSpec, JobStatus, ProgressDetail, TrainingConfig, TrainingRequest,
};

use crate::{ApiError, Studio};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrainingRequest {
    /// References to previously uploaded training inputs.
    #[serde(default)]
    pub training_data: Vec<String>,
    #[serde(default)]
    pub epochs: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl StartTrainingRequest {
    fn into_request(self) -> TrainingRequest {
        let defaults = TrainingConfig::default();
        TrainingRequest {
            config: TrainingConfig {
                epochs: self.epochs.unwrap_or(defaults.epochs),
                batch_size: self.batch_size.unwrap_or(defaults.batch_size),
                learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
                seed: self.seed,
            },
            samples: self.training_data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrainingResponse {
    pub job_id: JobId,
    pub status: String,
    pub estimated_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatusResponse {
    pub status: String,
    pub progress: f64,
    pub message: String,
    pub estimated_time_remaining: String,
}

pub(crate) fn parse_job_id(value: &str) -> Result<JobId, ApiError> {
    JobId::parse(value).map_err(|_| ApiError::invalid_id("job", value))
}

/// Whole seconds, rounded up, as `"<n>s"`.
pub(crate) fn format_secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs_f64().ceil() as u64)
}

/// One-line human summary of where a job stands.
pub(crate) fn status_message(job: &Job) -> String {
    match &job.status {
        JobStatus::Queued => "Queued".into(),
        JobStatus::Running { .. } => match &job.detail {
            Some(ProgressDetail::Training {
                epoch,
                total_epochs,
                loss,
                accuracy,
            }) => format!(
                "Epoch {epoch}/{total_epochs} - loss {loss:.4}, accuracy {accuracy:.4}"
            ),
            Some(ProgressDetail::Generation { message, .. }) => message.clone(),
            None => "Starting".into(),
        },
        JobStatus::Completed { result, .. } => result.summary.clone(),
        JobStatus::Failed { error, .. } => error.clone(),
        JobStatus::Cancelled { reason, .. } => {
            reason.clone().unwrap_or_else(|| "Cancelled".into())
        }
    }
}

impl Studio {
    /// `POST /training/start/:modelRef`
    ///
    /// `model_ref` is a model id or a model type. Returns as soon as the job
    /// is accepted.
    pub async fn start_training(
        &self,
        model_ref: &str,
        request: StartTrainingRequest,
    ) -> Result<StartTrainingResponse, ApiError> {
        let model_id = self.resolve_model(model_ref).await?;
        let spec = JobSpec::training(model_id, request.into_request());
        let estimate = self.estimate(&spec.params);

        let job = self.scheduler().submit(spec).await?;
        tracing::info!(job_id = %job.id, model_id = %model_id, "Training started");

        Ok(StartTrainingResponse {
            job_id: job.id,
            status: "processing".into(),
            estimated_time: format_secs(estimate),
        })
    }

    /// `GET /training/status/:jobId`
    pub async fn training_status(&self, job_id: &str) -> Result<TrainingStatusResponse, ApiError> {
        let job = self.scheduler().status(parse_job_id(job_id)?).await?;

        let remaining = if job.is_terminal() {
            Duration::ZERO
        } else {
            let left = ((100.0 - job.progress) / 100.0).clamp(0.0, 1.0);
            self.estimate(&job.params).mul_f64(left)
        };

        Ok(TrainingStatusResponse {
            status: job.status.as_str().into(),
            progress: job.progress,
            message: status_message(&job),
            estimated_time_remaining: format_secs(remaining),
        })
    }

    fn estimate(&self, params: &studio_core::JobParams) -> Duration {
        self.runners()
            .get(params.kind())
            .map(|runner| runner.estimate(params))
            .unwrap_or_default()
    }
}
