//! Worker actor that runs a single job.

use std::sync::Arc;

use futures_util::future;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use studio_core::{JobId, JobOutput, JobParams, ModelId, StudioError};
use tokio_util::sync::CancellationToken;

use crate::messages::{SchedulerMessage, WorkerMessage};
use crate::model_registry::ModelRegistry;
use crate::runner::{ProgressSink, RunContext, Runner, RunnerError};

/// Worker actor arguments.
pub struct WorkerArgs {
    pub job_id: JobId,
    pub model_id: ModelId,
    pub params: JobParams,
    pub runner: Arc<dyn Runner>,
    pub registry: ModelRegistry,
    pub scheduler: ActorRef<SchedulerMessage>,
    pub cancel: CancellationToken,
    /// Capacity of the progress channel between runner and worker.
    pub progress_buffer: usize,
}

/// Runs one job, forwards its progress to the scheduler, reports the
/// outcome exactly once and stops.
pub struct JobWorker;

impl JobWorker {
    async fn execute(state: &WorkerArgs) -> Result<JobOutput, RunnerError> {
        if state.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let model = match state.registry.get(state.model_id).await {
            Ok(model) => model,
            Err(StudioError::ModelNotFound(id)) => return Err(RunnerError::ModelNotFound(id)),
            Err(e) => return Err(RunnerError::Failed(e.to_string())),
        };

        state
            .scheduler
            .send_message(SchedulerMessage::JobStarted {
                job_id: state.job_id,
            })
            .map_err(|e| RunnerError::Failed(format!("scheduler unavailable: {e}")))?;

        let (sink, mut rx) = ProgressSink::channel(state.progress_buffer);
        let ctx = RunContext {
            job_id: state.job_id,
            model,
            params: state.params.clone(),
            cancel: state.cancel.clone(),
        };

        let scheduler = state.scheduler.clone();
        let forward = async move {
            while let Some(event) = rx.recv().await {
                if scheduler
                    .send_message(SchedulerMessage::JobProgress { event })
                    .is_err()
                {
                    break;
                }
            }
        };

        // The runner owns the sink, so the forwarder drains every event and
        // ends once the runner returns.
        let (outcome, ()) = future::join(state.runner.run(ctx, sink), forward).await;
        outcome
    }
}

impl Actor for JobWorker {
    type Msg = WorkerMessage;
    type State = WorkerArgs;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(job_id = %args.job_id, kind = %args.runner.kind(), "Starting worker");
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Run => {
                let outcome = Self::execute(state).await;
                if let Err(e) = &outcome {
                    tracing::debug!(
                        job_id = %state.job_id,
                        error = %e,
                        "Runner ended without output"
                    );
                }
                state.scheduler.send_message(SchedulerMessage::JobFinished {
                    job_id: state.job_id,
                    outcome,
                })?;
                myself.stop(None);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use studio_core::{ModelConfig, ModelKind, TrainingRequest};
    use tokio::sync::mpsc;

    use super::*;
    use crate::model_registry::start_model_registry;
    use crate::training_runner::TrainingRunner;

    /// Stands in for the scheduler and records what workers report.
    struct Recorder;

    impl Actor for Recorder {
        type Msg = SchedulerMessage;
        type State = mpsc::UnboundedSender<SchedulerMessage>;
        type Arguments = mpsc::UnboundedSender<SchedulerMessage>;

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            args: Self::Arguments,
        ) -> Result<Self::State, ActorProcessingErr> {
            Ok(args)
        }

        async fn handle(
            &self,
            _myself: ActorRef<Self::Msg>,
            message: Self::Msg,
            state: &mut Self::State,
        ) -> Result<(), ActorProcessingErr> {
            let _ = state.send(message);
            Ok(())
        }
    }

    /// Run one worker to completion and return everything it reported.
    async fn run_worker(
        model_id: ModelId,
        registry: ModelRegistry,
        cancel: CancellationToken,
    ) -> Result<(JobId, Vec<SchedulerMessage>), Box<dyn std::error::Error>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (recorder, _recorder_handle) = Actor::spawn(None, Recorder, tx).await?;

        let job_id = JobId::new();
        let args = WorkerArgs {
            job_id,
            model_id,
            params: JobParams::Training(TrainingRequest::new(vec!["a".into()], 3)),
            runner: Arc::new(TrainingRunner::new(Duration::from_millis(1))),
            registry,
            scheduler: recorder.clone(),
            cancel,
            progress_buffer: 8,
        };
        let (worker, handle) = Actor::spawn(None, JobWorker, args).await?;
        worker.send_message(WorkerMessage::Run)?;

        // The outcome is the last report, so everything before it is queued.
        let mut reports = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(message) = rx.recv().await {
                let finished = matches!(message, SchedulerMessage::JobFinished { .. });
                reports.push(message);
                if finished {
                    break;
                }
            }
        })
        .await?;
        tokio::time::timeout(Duration::from_secs(5), handle).await??;
        recorder.stop(None);
        Ok((job_id, reports))
    }

    #[tokio::test]
    async fn unloaded_model_fails_without_starting() -> Result<(), Box<dyn std::error::Error>> {
        let (registry, _handle) = start_model_registry().await?;
        let model_id = ModelId::new();

        let (job_id, reports) = run_worker(model_id, registry, CancellationToken::new()).await?;
        assert_eq!(reports.len(), 1);
        assert_matches!(
            &reports[0],
            SchedulerMessage::JobFinished {
                job_id: id,
                outcome: Err(RunnerError::ModelNotFound(m)),
            } if *id == job_id && *m == model_id
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_before_start_never_runs() -> Result<(), Box<dyn std::error::Error>> {
        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToVideo, ModelConfig::new()).await?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (job_id, reports) = run_worker(model.id, registry, cancel).await?;
        assert_eq!(reports.len(), 1);
        assert_matches!(
            &reports[0],
            SchedulerMessage::JobFinished { job_id: id, outcome: Err(RunnerError::Cancelled) }
                if *id == job_id
        );
        Ok(())
    }

    #[tokio::test]
    async fn registered_model_starts_then_finishes() -> Result<(), Box<dyn std::error::Error>> {
        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToVideo, ModelConfig::new()).await?;

        let (job_id, reports) = run_worker(model.id, registry, CancellationToken::new()).await?;
        assert_matches!(
            reports.first(),
            Some(SchedulerMessage::JobStarted { job_id: id }) if *id == job_id
        );
        let progress = reports
            .iter()
            .filter(|m| matches!(m, SchedulerMessage::JobProgress { .. }))
            .count();
        assert_eq!(progress, 3);
        assert_matches!(
            reports.last(),
            Some(SchedulerMessage::JobFinished { outcome: Ok(JobOutput::Training(_)), .. })
        );
        Ok(())
    }
}
