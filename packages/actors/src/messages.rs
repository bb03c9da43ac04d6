//! Message types for actor communication.

use std::path::PathBuf;

use ractor::RpcReplyPort;
use studio_core::{
    Job, JobId, JobOutput, JobSpec, Model, ModelConfig, ModelId, ModelKind, ProgressEvent,
    StudioError, TrainingMetrics,
};

use crate::runner::RunnerError;

/// Messages for the ModelRegistryActor.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Register a new untrained model.
    Create {
        kind: ModelKind,
        config: ModelConfig,
        reply: RpcReplyPort<Model>,
    },

    /// Re-register a model loaded from disk.
    Restore {
        model: Box<Model>,
        reply: RpcReplyPort<Result<(), StudioError>>,
    },

    /// Get a model by ID.
    Get {
        model_id: ModelId,
        reply: RpcReplyPort<Option<Model>>,
    },

    /// List all models.
    List { reply: RpcReplyPort<Vec<Model>> },

    /// Record the final metrics of a training run.
    MarkTrained {
        model_id: ModelId,
        metrics: TrainingMetrics,
        reply: RpcReplyPort<Result<Model, StudioError>>,
    },

    /// Write a model's metadata under `dir` and record the file path.
    Save {
        model_id: ModelId,
        dir: PathBuf,
        reply: RpcReplyPort<Result<PathBuf, StudioError>>,
    },

    /// Remove a model.
    Unload {
        model_id: ModelId,
        reply: RpcReplyPort<bool>,
    },
}

/// Messages for the SchedulerActor.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Validate and launch a new job.
    Submit {
        spec: JobSpec,
        reply: RpcReplyPort<Result<Job, StudioError>>,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List all retained jobs.
    ListJobs { reply: RpcReplyPort<Vec<Job>> },

    /// Request cooperative cancellation of a job.
    CancelJob {
        job_id: JobId,
        reason: Option<String>,
        reply: RpcReplyPort<Result<(), StudioError>>,
    },

    /// A worker started running its job.
    JobStarted { job_id: JobId },

    /// A worker forwarded a progress event.
    JobProgress { event: ProgressEvent },

    /// A worker finished; sent exactly once per job.
    JobFinished {
        job_id: JobId,
        outcome: Result<JobOutput, RunnerError>,
    },

    /// Shutdown the scheduler and its workers.
    Shutdown,

    /// Periodic tick for retention sweeps.
    Tick,
}

/// Messages for a JobWorker.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run the job this worker was spawned for, then stop.
    Run,
}
