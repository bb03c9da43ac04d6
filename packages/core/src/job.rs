//! Job domain types and the job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{
    GenerationRequest, ModelId, ProgressEvent, ProgressPayload, StudioError, TrainingMetrics,
    TrainingRequest,
};

/// Highest progress a job may report before it has completed.
pub const MAX_RUNNING_PROGRESS: f64 = 99.0;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two operations the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Training,
    Generation,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Training => write!(f, "training"),
            JobKind::Generation => write!(f, "generation"),
        }
    }
}

/// Kind-specific parameters of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobParams {
    Training(TrainingRequest),
    Generation(GenerationRequest),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Training(_) => JobKind::Training,
            JobParams::Generation(_) => JobKind::Generation,
        }
    }
}

/// A request to run a job against a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub model_id: ModelId,
    pub params: JobParams,
}

impl JobSpec {
    pub fn training(model_id: ModelId, request: TrainingRequest) -> Self {
        Self {
            model_id,
            params: JobParams::Training(request),
        }
    }

    pub fn generation(model_id: ModelId, request: GenerationRequest) -> Self {
        Self {
            model_id,
            params: JobParams::Generation(request),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }
}

/// Descriptor of a generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub width: u32,
    pub height: u32,
    /// Length in seconds.
    pub duration: f64,
    pub fps: u32,
    pub frames: u64,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub prompt: String,
    pub model_id: ModelId,
    pub generated_at: DateTime<Utc>,
}

/// What a successful runner produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobOutput {
    Training(TrainingMetrics),
    Generation(ArtifactDescriptor),
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    pub output: JobOutput,
}

impl JobResult {
    pub fn new(summary: impl Into<String>, output: JobOutput) -> Self {
        Self {
            summary: summary.into(),
            output,
        }
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, runner not started yet.
    #[default]
    Queued,
    Running { started_at: DateTime<Utc> },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: JobResult,
    },
    /// `started_at` is absent when the job failed before it ever ran.
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        failed_at: DateTime<Utc>,
        error: String,
    },
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        cancelled_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled { .. }
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running { .. } => "running",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Cancelled { .. } => "cancelled",
        }
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobStatus::Queued => None,
            JobStatus::Running { started_at } | JobStatus::Completed { started_at, .. } => {
                Some(*started_at)
            }
            JobStatus::Failed { started_at, .. } | JobStatus::Cancelled { started_at, .. } => {
                *started_at
            }
        }
    }
}

/// Latest kind-specific detail reported by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressDetail {
    Training {
        epoch: u32,
        total_epochs: u32,
        loss: f64,
        accuracy: f64,
    },
    Generation {
        step: u32,
        total_steps: u32,
        message: String,
    },
}

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub model_id: ModelId,
    pub params: JobParams,
    #[serde(flatten)]
    pub status: JobStatus,
    /// Percentage in `0..=100`, never decreasing.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProgressDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job from a spec.
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: spec.kind(),
            model_id: spec.model_id,
            params: spec.params,
            status: JobStatus::Queued,
            progress: 0.0,
            detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.status.started_at()
    }

    /// When the job reached a terminal state, whatever that state is.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            JobStatus::Completed { completed_at, .. } => Some(*completed_at),
            JobStatus::Failed { failed_at, .. } => Some(*failed_at),
            JobStatus::Cancelled { cancelled_at, .. } => Some(*cancelled_at),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.status {
            JobStatus::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    fn transition_error(&self, to: &'static str) -> StudioError {
        StudioError::InvalidTransition {
            job_id: self.id,
            from: self.status.as_str(),
            to,
        }
    }

    /// `queued -> running`.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), StudioError> {
        if !matches!(self.status, JobStatus::Queued) {
            return Err(self.transition_error("running"));
        }
        self.status = JobStatus::Running { started_at: now };
        self.updated_at = now;
        Ok(())
    }

    /// Fold a progress event into the job.
    ///
    /// Progress never decreases and stays below 100 until completion.
    pub fn apply_progress(&mut self, event: &ProgressEvent) -> Result<(), StudioError> {
        if !matches!(self.status, JobStatus::Running { .. }) {
            return Err(self.transition_error("running"));
        }
        let capped = event.progress.clamp(0.0, MAX_RUNNING_PROGRESS);
        self.progress = self.progress.max(capped);
        self.detail = Some(match &event.payload {
            ProgressPayload::Training {
                epoch,
                total_epochs,
                loss,
                accuracy,
            } => ProgressDetail::Training {
                epoch: *epoch,
                total_epochs: *total_epochs,
                loss: *loss,
                accuracy: *accuracy,
            },
            ProgressPayload::Generation {
                step,
                total_steps,
                message,
            } => ProgressDetail::Generation {
                step: *step,
                total_steps: *total_steps,
                message: message.clone(),
            },
        });
        self.updated_at = event.timestamp;
        Ok(())
    }

    /// `running -> completed`.
    pub fn complete(&mut self, result: JobResult, now: DateTime<Utc>) -> Result<(), StudioError> {
        let JobStatus::Running { started_at } = self.status else {
            return Err(self.transition_error("completed"));
        };
        self.status = JobStatus::Completed {
            started_at,
            completed_at: now,
            result,
        };
        self.progress = 100.0;
        self.updated_at = now;
        Ok(())
    }

    /// `queued | running -> failed`.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StudioError> {
        if self.is_terminal() {
            return Err(self.transition_error("failed"));
        }
        self.status = JobStatus::Failed {
            started_at: self.started_at(),
            failed_at: now,
            error: error.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    /// `queued | running -> cancelled`.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StudioError> {
        if self.is_terminal() {
            return Err(self.transition_error("cancelled"));
        }
        self.status = JobStatus::Cancelled {
            started_at: self.started_at(),
            cancelled_at: now,
            reason,
        };
        self.updated_at = now;
        Ok(())
    }
}
