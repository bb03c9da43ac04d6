//! Progress events and the job update snapshots built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Kind-specific part of a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressPayload {
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

/// One step forward of a running job, as emitted by its runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub payload: ProgressPayload,
    /// Cumulative progress in percent.
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// End-of-epoch event; progress is `epoch / total_epochs * 100`.
    pub fn training(
        job_id: JobId,
        epoch: u32,
        total_epochs: u32,
        loss: f64,
        accuracy: f64,
    ) -> Self {
        Self {
            job_id,
            progress: percent(epoch, total_epochs),
            payload: ProgressPayload::Training {
                epoch,
                total_epochs,
                loss,
                accuracy,
            },
            timestamp: Utc::now(),
        }
    }

    /// Named generation step; progress is `step / total_steps * 100`.
    pub fn generation(
        job_id: JobId,
        step: u32,
        total_steps: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            progress: percent(step, total_steps),
            payload: ProgressPayload::Generation {
                step,
                total_steps,
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match &self.payload {
            ProgressPayload::Training {
                epoch,
                total_epochs,
                loss,
                accuracy,
            } => format!(
                "Epoch {}/{} - loss {:.4}, accuracy {:.4}",
                epoch, total_epochs, loss, accuracy
            ),
            ProgressPayload::Generation {
                step,
                total_steps,
                message,
            } => format!("Step {}/{}: {}", step, total_steps, message),
        }
    }
}

fn percent(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(done) / f64::from(total) * 100.0
}

/// Why a job update was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "event", rename_all = "snake_case")]
pub enum UpdateCause {
    Submitted,
    Started,
    Progress(ProgressEvent),
    /// The job reached a terminal state; published exactly once.
    Finished,
}

/// Immutable job snapshot delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: JobId,
    /// Strictly increasing per job, starting at 1.
    pub sequence: u64,
    pub cause: UpdateCause,
    pub job: Job,
}

impl JobUpdate {
    pub fn new(sequence: u64, cause: UpdateCause, job: Job) -> Self {
        Self {
            job_id: job.id,
            sequence,
            cause,
            job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.job.is_terminal()
    }

    /// The progress event carried by this update, if any.
    pub fn progress_event(&self) -> Option<&ProgressEvent> {
        match &self.cause {
            UpdateCause::Progress(event) => Some(event),
            _ => None,
        }
    }

    /// Get a short description of this update for logging.
    pub fn description(&self) -> String {
        match &self.cause {
            UpdateCause::Submitted => format!("Job {} queued", self.job_id),
            UpdateCause::Started => format!("Job {} started", self.job_id),
            UpdateCause::Progress(event) => format!("Job {} {}", self.job_id, event.description()),
            UpdateCause::Finished => match self.job.error() {
                Some(error) => format!("Job {} failed: {}", self.job_id, error),
                None => format!("Job {} {}", self.job_id, self.job.status.as_str()),
            },
        }
    }
}
