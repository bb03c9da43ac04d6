//! Runner trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use studio_core::{JobId, JobKind, JobOutput, JobParams, Model, ModelId, ProgressEvent, StudioError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How a runner can end without producing output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerError {
    /// The cancel token was observed at a step boundary.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    /// The model disappeared before the job could start.
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),
}

/// Future type for async runners.
pub type RunnerFuture = Pin<Box<dyn Future<Output = Result<JobOutput, RunnerError>> + Send>>;

/// Everything a runner gets to see about the job it runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_id: JobId,
    /// Snapshot of the model taken when the job started.
    pub model: Model,
    pub params: JobParams,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Cancelled` if cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), RunnerError> {
        if self.cancel.is_cancelled() {
            Err(RunnerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where a runner reports progress.
///
/// Backed by a bounded channel, so a runner that outpaces its consumer
/// waits instead of growing memory.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiving end of its channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Emit an event, waiting for buffer space.
    pub async fn emit(&self, event: ProgressEvent) -> Result<(), RunnerError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RunnerError::Failed("progress channel closed".into()))
    }
}

/// Executes one kind of job.
pub trait Runner: Send + Sync + 'static {
    /// The job kind this runner handles.
    fn kind(&self) -> JobKind;

    /// Reject parameters before a job is created.
    fn validate(&self, params: &JobParams) -> Result<(), StudioError>;

    /// Rough wall-clock estimate for a job with these parameters.
    fn estimate(&self, params: &JobParams) -> Duration;

    /// Run the job to completion, emitting progress as it goes.
    fn run(&self, ctx: RunContext, sink: ProgressSink) -> RunnerFuture;
}

/// Maps job kinds to their runners.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<JobKind, Arc<dyn Runner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Register a runner, replacing any runner for the same kind.
    pub fn register<R: Runner>(&mut self, runner: R) {
        self.runners.insert(runner.kind(), Arc::new(runner));
    }

    pub fn with<R: Runner>(mut self, runner: R) -> Self {
        self.register(runner);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn Runner>> {
        self.runners.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        self.runners.keys().copied().collect()
    }
}
