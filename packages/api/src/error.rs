//! API error type and its wire shape.

use serde::{Deserialize, Serialize};
use studio_core::StudioError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Studio(#[from] StudioError),

    #[error("Invalid {what} ID: {value}")]
    InvalidId { what: &'static str, value: String },

    #[error("Unsupported model type: {0}")]
    UnsupportedModelType(String),

    #[error("No models are registered")]
    NoModels,

    /// The job ran but did not complete.
    #[error("Job {status}: {message}")]
    JobNotCompleted { status: &'static str, message: String },
}

/// Body returned alongside an error status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ApiError {
    pub fn invalid_id(what: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidId {
            what,
            value: value.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Studio(err) if err.is_not_found() => 404,
            ApiError::Studio(
                StudioError::InvalidConfig(_)
                | StudioError::JobFinished(_)
                | StudioError::InvalidTransition { .. },
            ) => 400,
            ApiError::Studio(_) => 500,
            ApiError::InvalidId { .. } | ApiError::UnsupportedModelType(_) => 400,
            ApiError::NoModels => 404,
            ApiError::JobNotCompleted { .. } => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
        }
    }
}
