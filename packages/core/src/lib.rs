//! Core domain types for the studio job system.
//!
//! This crate contains shared types used across all packages:
//! - Model and ModelKind for registered models
//! - Job, JobSpec and JobStatus for tracked work
//! - ProgressEvent and JobUpdate for live updates
//! - StudioError, the error taxonomy every layer speaks

mod error;
mod events;
mod job;
mod model;
mod request;

pub use error::StudioError;
pub use events::{JobUpdate, ProgressEvent, ProgressPayload, UpdateCause};
pub use job::{
    ArtifactDescriptor, Job, JobId, JobKind, JobOutput, JobParams, JobResult, JobSpec, JobStatus,
    MAX_RUNNING_PROGRESS, ProgressDetail,
};
pub use model::{Model, ModelConfig, ModelId, ModelKind, TrainingMetrics};
pub use request::{GenerationRequest, MAX_EPOCHS, Resolution, TrainingConfig, TrainingRequest};
