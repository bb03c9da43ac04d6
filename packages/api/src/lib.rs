//! Service layer for the studio.
//!
//! Transport-agnostic functions on the [`Studio`] facade whose request and
//! response types serialize to the JSON shapes of the HTTP routes:
//! - Models (list, get, create, save, delete)
//! - Training (start, status)
//! - Generation (generate and wait for the artifact)
//! - Jobs (list, status, cancel)
//! - Real-time updates over a WebSocket session

mod config;
mod error;
mod generation;
mod init;
mod jobs;
mod models;
mod realtime;
mod training;

pub use config::{ConfigError, StudioConfig};
pub use error::{ApiError, ErrorBody};
pub use generation::{GenerateRequest, GenerateResponse};
pub use init::{InitError, Studio, default_runners, init_studio, init_studio_with};
pub use jobs::{CancelJobRequest, JobList, JobResponse};
pub use models::{
    ActionResponse, CreateModelRequest, CreateModelResponse, ModelList, ModelResponse,
    SaveModelResponse,
};
pub use realtime::{ServerMessage, WsSession};
pub use training::{StartTrainingRequest, StartTrainingResponse, TrainingStatusResponse};

// Re-export core types for convenience
pub use studio_core::{Job, JobId, JobStatus, Model, ModelId, ModelKind};

impl Studio {
    /// Open a WebSocket session bound to this studio's updates.
    pub fn open_session(
        &self,
    ) -> (WsSession, tokio::sync::mpsc::UnboundedReceiver<ServerMessage>) {
        WsSession::channel(self.scheduler().broadcaster().clone())
    }
}
