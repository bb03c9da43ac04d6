//! Actor system for models and jobs.
//!
//! This crate provides the Ractor-based actors behind the studio: the model
//! registry, the job scheduler with one worker per job, the runners that do
//! the work and the broadcaster that fans job updates out to subscribers.
//!
//! # Architecture
//!
//! - `ModelRegistryActor` - Owns every registered model
//! - `SchedulerActor` - Owns every job, applies worker reports, publishes updates
//! - `JobWorker` - Runs a single job through its `Runner`, then stops
//! - `Broadcaster` - Per-job pub/sub plus a firehose of all updates
//!
//! # Usage
//!
//! ```ignore
//! use actors::*;
//!
//! let (models, _) = start_model_registry().await?;
//! let runners = RunnerRegistry::new()
//!     .with(TrainingRunner::default())
//!     .with(GenerationRunner::default());
//! let (scheduler, _) = start_scheduler(SchedulerArgs {
//!     registry: models.clone(),
//!     runners,
//!     broadcaster: Arc::new(Broadcaster::new()),
//!     config: SchedulerConfig::default(),
//! })
//! .await?;
//!
//! let job = scheduler.submit(JobSpec::training(model_id, request)).await?;
//! let done = scheduler.wait(job.id).await?;
//! ```

mod broadcaster;
mod generation_runner;
mod messages;
mod model_registry;
mod persistence;
mod runner;
mod scheduler;
mod training_runner;
mod worker_actor;

use ractor::{ActorRef, RpcReplyPort};
use studio_core::StudioError;

pub use broadcaster::{Broadcaster, SinkClosed, SubscriptionId, UpdateSink};
pub use generation_runner::{DEFAULT_STEPS, GenerationRunner};
pub use messages::{RegistryMessage, SchedulerMessage, WorkerMessage};
pub use model_registry::{ModelRegistry, ModelRegistryActor, start_model_registry};
pub use persistence::{LoadedModel, ModelStore, PersistenceError};
pub use runner::{ProgressSink, RunContext, Runner, RunnerError, RunnerFuture, RunnerRegistry};
pub use scheduler::{
    JobScheduler, JobTable, JobWatch, RetentionPolicy, SHUTDOWN_REASON, SchedulerActor,
    SchedulerArgs, SchedulerConfig, start_scheduler,
};
pub use training_runner::TrainingRunner;
pub use worker_actor::{JobWorker, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, SpawnErr, concurrency};

/// Send a request to an actor and wait for its reply.
pub(crate) async fn request<M, T>(
    actor: &ActorRef<M>,
    build: impl FnOnce(RpcReplyPort<T>) -> M,
) -> Result<T, StudioError>
where
    M: ractor::Message,
    T: Send + 'static,
{
    let (tx, rx) = ractor::concurrency::oneshot();
    actor
        .send_message(build(tx.into()))
        .map_err(|e| StudioError::Unavailable(format!("Failed to send message: {}", e)))?;
    rx.await
        .map_err(|_| StudioError::Unavailable("Failed to receive response".into()))
}
