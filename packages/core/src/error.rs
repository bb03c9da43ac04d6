//! Error taxonomy shared by every layer of the studio.

use crate::{JobId, ModelId};

/// Errors surfaced by the model registry, the job scheduler and the runners.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StudioError {
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("runner failure: {0}")]
    RunnerFailure(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The job already reached a terminal state.
    #[error("job {0} already finished")]
    JobFinished(JobId),

    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },

    /// An actor mailbox was closed or a reply was dropped.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl StudioError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the error refers to a missing model or job.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::JobNotFound(_))
    }
}

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
