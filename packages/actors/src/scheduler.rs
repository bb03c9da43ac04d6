//! Job scheduler actor, its job table and the typed handle callers use.
//!
//! The scheduler owns every job record. Workers never touch a job directly:
//! they report `JobStarted`, each progress event and one `JobFinished`
//! through the scheduler's mailbox, and the scheduler applies them in order,
//! bumps the job's sequence and publishes one snapshot per change.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use studio_core::{
    Job, JobId, JobOutput, JobResult, JobSpec, JobStatus, JobUpdate, ModelId, ProgressEvent,
    StudioError, TrainingMetrics, UpdateCause,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::{Broadcaster, SubscriptionId};
use crate::messages::{SchedulerMessage, WorkerMessage};
use crate::model_registry::ModelRegistry;
use crate::request;
use crate::runner::{RunnerError, RunnerRegistry};
use crate::worker_actor::{JobWorker, WorkerArgs};

/// Cancellation reason recorded for jobs still unfinished at shutdown.
pub const SHUTDOWN_REASON: &str = "scheduler shutting down";

/// When finished jobs are forgotten.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    /// Terminal jobs older than this are evicted.
    pub max_age: Duration,
    /// At most this many terminal jobs are kept; the oldest go first.
    pub max_finished: usize,
    /// How often the sweep runs. Zero disables it.
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60 * 60),
            max_finished: 1000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub progress_buffer: usize,
    pub retention: RetentionPolicy,
    /// Save models here after each successful training job.
    pub autosave_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            progress_buffer: 64,
            retention: RetentionPolicy::default(),
            autosave_dir: None,
        }
    }
}

/// Everything the scheduler needs to start.
pub struct SchedulerArgs {
    pub registry: ModelRegistry,
    pub runners: RunnerRegistry,
    pub broadcaster: Arc<Broadcaster>,
    pub config: SchedulerConfig,
}

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
    cancel_reason: Option<String>,
    sequence: u64,
}

/// Every job the scheduler still remembers, plus which worker runs which job.
#[derive(Default)]
pub struct JobTable {
    entries: HashMap<JobId, JobEntry>,
    workers: HashMap<ActorId, JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, job: Job, cancel: CancellationToken, worker: Option<ActorId>) {
        if let Some(worker) = worker {
            self.workers.insert(worker, job.id);
        }
        self.entries.insert(
            job.id,
            JobEntry {
                job,
                cancel,
                cancel_reason: None,
                sequence: 0,
            },
        );
    }

    pub fn get(&self, job_id: JobId) -> Option<&Job> {
        self.entries.get(&job_id).map(|e| &e.job)
    }

    /// All jobs ordered by creation time.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.entries.values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn job_for_worker(&self, worker: &ActorId) -> Option<JobId> {
        self.workers.get(worker).copied()
    }

    fn forget_worker(&mut self, worker: &ActorId) -> Option<JobId> {
        self.workers.remove(worker)
    }

    /// Evict terminal jobs past the policy's age or count limits.
    ///
    /// Queued and running jobs are never evicted. Returns the evicted ids.
    pub fn sweep(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<JobId> {
        let max_age = TimeDelta::from_std(policy.max_age).unwrap_or(TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(max_age);

        let mut finished: Vec<(DateTime<Utc>, JobId)> = self
            .entries
            .values()
            .filter_map(|e| e.job.completed_at().map(|at| (at, e.job.id)))
            .collect();
        finished.sort();

        let mut evicted = Vec::new();
        let mut kept = Vec::new();
        for (at, id) in finished {
            if cutoff.is_some_and(|cutoff| at < cutoff) {
                evicted.push(id);
            } else {
                kept.push(id);
            }
        }
        if kept.len() > policy.max_finished {
            let excess = kept.len() - policy.max_finished;
            evicted.extend(kept.drain(..excess));
        }

        for id in &evicted {
            self.entries.remove(id);
        }
        evicted
    }
}

/// State for the scheduler actor.
pub struct SchedulerState {
    table: JobTable,
    registry: ModelRegistry,
    runners: RunnerRegistry,
    broadcaster: Arc<Broadcaster>,
    config: SchedulerConfig,
}

impl SchedulerState {
    /// Bump the job's sequence and publish its current snapshot.
    fn publish(&mut self, job_id: JobId, cause: UpdateCause) {
        let Some(entry) = self.table.entries.get_mut(&job_id) else {
            return;
        };
        entry.sequence += 1;
        let update = JobUpdate::new(entry.sequence, cause, entry.job.clone());
        tracing::debug!(job_id = %job_id, sequence = update.sequence, "{}", update.description());
        self.broadcaster.publish(&update);
    }

    async fn submit(
        &mut self,
        myself: &ActorRef<SchedulerMessage>,
        spec: JobSpec,
    ) -> Result<Job, StudioError> {
        let kind = spec.kind();
        let runner = self
            .runners
            .get(kind)
            .ok_or_else(|| StudioError::invalid_config(format!("no runner for {kind} jobs")))?;

        self.registry.get(spec.model_id).await?;
        runner.validate(&spec.params)?;

        let job = Job::new(spec);
        let cancel = CancellationToken::new();
        let args = WorkerArgs {
            job_id: job.id,
            model_id: job.model_id,
            params: job.params.clone(),
            runner,
            registry: self.registry.clone(),
            scheduler: myself.clone(),
            cancel: cancel.clone(),
            progress_buffer: self.config.progress_buffer,
        };

        let (worker, _handle) = Actor::spawn_linked(None, JobWorker, args, myself.get_cell())
            .await
            .map_err(|e| StudioError::Unavailable(format!("failed to spawn worker: {e}")))?;
        // The worker reports back through this mailbox, so nothing it sends
        // is seen before the submitted update below.
        worker
            .send_message(WorkerMessage::Run)
            .map_err(|e| StudioError::Unavailable(format!("failed to start worker: {e}")))?;

        tracing::info!(job_id = %job.id, kind = %kind, model_id = %job.model_id, "Job submitted");
        self.table.insert(job.clone(), cancel, Some(worker.get_id()));
        self.publish(job.id, UpdateCause::Submitted);
        Ok(job)
    }

    fn started(&mut self, job_id: JobId) {
        let Some(entry) = self.table.entries.get_mut(&job_id) else {
            return;
        };
        if let Err(e) = entry.job.mark_running(Utc::now()) {
            tracing::warn!(job_id = %job_id, error = %e, "Ignoring start");
            return;
        }
        tracing::info!(job_id = %job_id, "Job started");
        self.publish(job_id, UpdateCause::Started);
    }

    fn progress(&mut self, event: ProgressEvent) {
        let job_id = event.job_id;
        let Some(entry) = self.table.entries.get_mut(&job_id) else {
            return;
        };
        if let Err(e) = entry.job.apply_progress(&event) {
            tracing::warn!(job_id = %job_id, error = %e, "Ignoring progress");
            return;
        }
        self.publish(job_id, UpdateCause::Progress(event));
    }

    /// Apply a worker outcome. A job finishes at most once; later outcomes
    /// for the same job are ignored.
    async fn finish(&mut self, job_id: JobId, outcome: Result<JobOutput, RunnerError>) {
        let Some(model_id) = self
            .table
            .get(job_id)
            .filter(|job| !job.is_terminal())
            .map(|job| job.model_id)
        else {
            tracing::debug!(job_id = %job_id, "Ignoring outcome for finished job");
            return;
        };

        // Record the trained model before anyone can observe completion.
        if let Ok(JobOutput::Training(metrics)) = &outcome {
            self.after_training(model_id, *metrics).await;
        }

        let Some(entry) = self.table.entries.get_mut(&job_id) else {
            return;
        };
        let now = Utc::now();
        let applied = match outcome {
            Ok(output) => {
                let summary = summarize(&output);
                entry.job.complete(JobResult::new(summary, output), now)
            }
            Err(RunnerError::Cancelled) => entry.job.cancel(entry.cancel_reason.clone(), now),
            Err(RunnerError::Failed(message)) => entry.job.fail(message, now),
            Err(RunnerError::ModelNotFound(id)) => {
                entry.job.fail(StudioError::ModelNotFound(id).to_string(), now)
            }
        };
        if let Err(e) = applied {
            tracing::error!(job_id = %job_id, error = %e, "Job outcome rejected");
            if entry.job.fail(e.to_string(), now).is_err() {
                return;
            }
        }

        match &entry.job.status {
            JobStatus::Failed { error, .. } => {
                tracing::warn!(job_id = %job_id, error = %error, "Job failed")
            }
            status => tracing::info!(job_id = %job_id, status = status.as_str(), "Job finished"),
        }
        self.publish(job_id, UpdateCause::Finished);
    }

    async fn after_training(&self, model_id: ModelId, metrics: TrainingMetrics) {
        if let Err(e) = self.registry.mark_trained(model_id, metrics).await {
            tracing::warn!(model_id = %model_id, error = %e, "Could not mark model trained");
            return;
        }
        // The disk write stays off the scheduler's mailbox.
        if let Some(dir) = self.config.autosave_dir.clone() {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                match registry.save(model_id, dir).await {
                    Ok(path) => {
                        tracing::info!(model_id = %model_id, path = ?path, "Model autosaved")
                    }
                    Err(e) => tracing::warn!(model_id = %model_id, error = %e, "Autosave failed"),
                }
            });
        }
    }

    fn cancel(&mut self, job_id: JobId, reason: Option<String>) -> Result<(), StudioError> {
        let entry = self
            .table
            .entries
            .get_mut(&job_id)
            .ok_or(StudioError::JobNotFound(job_id))?;
        if entry.job.is_terminal() {
            return Err(StudioError::JobFinished(job_id));
        }
        if entry.cancel_reason.is_none() {
            entry.cancel_reason = reason;
        }
        entry.cancel.cancel();
        tracing::info!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    /// Cancel every unfinished job and publish its final update, then close
    /// every subscription.
    fn shutdown(&mut self) {
        let now = Utc::now();
        let unfinished: Vec<JobId> = self
            .table
            .entries
            .values()
            .filter(|e| !e.job.is_terminal())
            .map(|e| e.job.id)
            .collect();

        for job_id in &unfinished {
            let Some(entry) = self.table.entries.get_mut(job_id) else {
                continue;
            };
            entry.cancel.cancel();
            let reason = entry
                .cancel_reason
                .clone()
                .unwrap_or_else(|| SHUTDOWN_REASON.to_string());
            if let Err(e) = entry.job.cancel(Some(reason), now) {
                tracing::warn!(job_id = %job_id, error = %e, "Could not cancel job on shutdown");
                continue;
            }
            self.publish(*job_id, UpdateCause::Finished);
        }

        let job_ids: Vec<JobId> = self.table.entries.keys().copied().collect();
        for job_id in job_ids {
            self.broadcaster.drop_job(job_id);
        }
        tracing::info!(cancelled = unfinished.len(), "Shutting down job scheduler");
    }

    fn sweep(&mut self) {
        let evicted = self.table.sweep(&self.config.retention, Utc::now());
        for job_id in &evicted {
            self.broadcaster.drop_job(*job_id);
        }
        if !evicted.is_empty() {
            tracing::info!(
                count = evicted.len(),
                remaining = self.table.len(),
                "Evicted finished jobs"
            );
        }
    }
}

fn summarize(output: &JobOutput) -> String {
    match output {
        JobOutput::Training(metrics) => format!(
            "Trained {} epochs, final loss {:.4}, accuracy {:.4}",
            metrics.epochs, metrics.loss, metrics.accuracy
        ),
        JobOutput::Generation(artifact) => format!(
            "Generated {}x{} {} ({} frames)",
            artifact.width, artifact.height, artifact.format, artifact.frames
        ),
    }
}

/// Scheduler actor.
pub struct SchedulerActor;

impl Actor for SchedulerActor {
    type Msg = SchedulerMessage;
    type State = SchedulerState;
    type Arguments = SchedulerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            runners = ?args.runners.kinds(),
            progress_buffer = args.config.progress_buffer,
            "Starting job scheduler"
        );

        let period = args.config.retention.sweep_interval;
        if !period.is_zero() {
            let myself_clone = myself.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    if myself_clone.send_message(SchedulerMessage::Tick).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(SchedulerState {
            table: JobTable::new(),
            registry: args.registry,
            runners: args.runners,
            broadcaster: args.broadcaster,
            config: args.config,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::Submit { spec, reply } => {
                let result = state.submit(&myself, spec).await;
                if let Err(e) = &result {
                    tracing::info!(error = %e, "Job rejected");
                }
                let _ = reply.send(result);
            }

            SchedulerMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.table.get(job_id).cloned());
            }

            SchedulerMessage::ListJobs { reply } => {
                let _ = reply.send(state.table.list());
            }

            SchedulerMessage::CancelJob {
                job_id,
                reason,
                reply,
            } => {
                let _ = reply.send(state.cancel(job_id, reason));
            }

            SchedulerMessage::JobStarted { job_id } => state.started(job_id),

            SchedulerMessage::JobProgress { event } => state.progress(event),

            SchedulerMessage::JobFinished { job_id, outcome } => {
                state.finish(job_id, outcome).await;
            }

            SchedulerMessage::Shutdown => {
                state.shutdown();
                myself.stop(None);
                return Ok(());
            }

            SchedulerMessage::Tick => state.sweep(),
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                let worker = cell.get_id();
                if let Some(job_id) = state.table.forget_worker(&worker) {
                    tracing::error!(job_id = %job_id, error = %err, "Worker failed");
                    state
                        .finish(job_id, Err(RunnerError::Failed(format!("worker failed: {err}"))))
                        .await;
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let worker = cell.get_id();
                if let Some(job_id) = state.table.job_for_worker(&worker) {
                    tracing::debug!(job_id = %job_id, reason = ?reason, "Worker stopped");
                }
                state.table.forget_worker(&worker);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Ordered stream of updates for one job.
///
/// Unsubscribes when dropped.
pub struct JobWatch {
    job_id: JobId,
    subscription: SubscriptionId,
    rx: mpsc::UnboundedReceiver<JobUpdate>,
    broadcaster: Arc<Broadcaster>,
}

impl JobWatch {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next update, or `None` once the job has been evicted.
    pub async fn next(&mut self) -> Option<JobUpdate> {
        self.rx.recv().await
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.job_id, self.subscription);
    }
}

/// Cloneable handle to the scheduler actor.
#[derive(Clone)]
pub struct JobScheduler {
    actor: ActorRef<SchedulerMessage>,
    broadcaster: Arc<Broadcaster>,
}

impl JobScheduler {
    pub fn new(actor: ActorRef<SchedulerMessage>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { actor, broadcaster }
    }

    pub fn actor(&self) -> &ActorRef<SchedulerMessage> {
        &self.actor
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Validate a job and start it. Returns the queued job immediately.
    pub async fn submit(&self, spec: JobSpec) -> Result<Job, StudioError> {
        request(&self.actor, |reply| SchedulerMessage::Submit { spec, reply }).await?
    }

    /// Latest snapshot of a job, or `JobNotFound`.
    pub async fn status(&self, job_id: JobId) -> Result<Job, StudioError> {
        request(&self.actor, |reply| SchedulerMessage::GetJob { job_id, reply })
            .await?
            .ok_or(StudioError::JobNotFound(job_id))
    }

    pub async fn list(&self) -> Result<Vec<Job>, StudioError> {
        request(&self.actor, |reply| SchedulerMessage::ListJobs { reply }).await
    }

    /// Ask a queued or running job to stop at its next step boundary.
    pub async fn cancel(&self, job_id: JobId, reason: Option<String>) -> Result<(), StudioError> {
        request(&self.actor, |reply| SchedulerMessage::CancelJob {
            job_id,
            reason,
            reply,
        })
        .await?
    }

    /// Subscribe first, then read the snapshot, so no update falls between.
    async fn watch_with_snapshot(&self, job_id: JobId) -> Result<(JobWatch, Job), StudioError> {
        let (subscription, rx) = self.broadcaster.subscribe_channel(job_id);
        let watch = JobWatch {
            job_id,
            subscription,
            rx,
            broadcaster: self.broadcaster.clone(),
        };
        let job = self.status(job_id).await?;
        Ok((watch, job))
    }

    /// Stream every update of a job from now on.
    pub async fn watch(&self, job_id: JobId) -> Result<JobWatch, StudioError> {
        Ok(self.watch_with_snapshot(job_id).await?.0)
    }

    /// Wait until a job reaches a terminal state and return that snapshot.
    pub async fn wait(&self, job_id: JobId) -> Result<Job, StudioError> {
        let (mut watch, job) = self.watch_with_snapshot(job_id).await?;
        if job.is_terminal() {
            return Ok(job);
        }
        while let Some(update) = watch.next().await {
            if update.is_terminal() {
                return Ok(update.job);
            }
        }
        Err(StudioError::Unavailable(format!(
            "updates for job {job_id} ended before it finished"
        )))
    }

    /// Stop the scheduler, cancelling every unfinished job.
    pub fn shutdown(&self) -> Result<(), StudioError> {
        self.actor
            .send_message(SchedulerMessage::Shutdown)
            .map_err(|e| StudioError::Unavailable(e.to_string()))
    }
}

/// Start the job scheduler.
pub async fn start_scheduler(
    args: SchedulerArgs,
) -> Result<(JobScheduler, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let broadcaster = args.broadcaster.clone();
    let (actor, handle) = Actor::spawn(None, SchedulerActor, args).await?;
    Ok((JobScheduler::new(actor, broadcaster), handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::TrainingRequest;

    fn finished_job(finished_at: DateTime<Utc>) -> Job {
        let mut job = Job::new(JobSpec::training(
            ModelId::new(),
            TrainingRequest::new(vec!["a".into()], 1),
        ));
        job.mark_running(finished_at - TimeDelta::seconds(1)).unwrap();
        let metrics = TrainingMetrics {
            loss: 0.5,
            accuracy: 0.6,
            epochs: 1,
        };
        job.complete(JobResult::new("done", JobOutput::Training(metrics)), finished_at)
            .unwrap();
        job
    }

    fn running_job() -> Job {
        let mut job = Job::new(JobSpec::training(
            ModelId::new(),
            TrainingRequest::new(vec!["a".into()], 1),
        ));
        job.mark_running(Utc::now() - TimeDelta::days(2)).unwrap();
        job
    }

    #[test]
    fn sweep_evicts_old_terminal_jobs_only() {
        let now = Utc::now();
        let policy = RetentionPolicy::default();
        let mut table = JobTable::new();

        let old = finished_job(now - TimeDelta::hours(2));
        let recent = finished_job(now - TimeDelta::minutes(5));
        let running = running_job();
        for job in [&old, &recent, &running] {
            table.insert(job.clone(), CancellationToken::new(), None);
        }

        assert_eq!(table.sweep(&policy, now), vec![old.id]);
        assert!(table.get(recent.id).is_some());
        assert!(table.get(running.id).is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn sweep_caps_finished_jobs_oldest_first() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_finished: 2,
            ..RetentionPolicy::default()
        };
        let mut table = JobTable::new();
        let jobs: Vec<Job> = (1..=4)
            .map(|i| finished_job(now - TimeDelta::minutes(10 - i)))
            .collect();
        for job in &jobs {
            table.insert(job.clone(), CancellationToken::new(), None);
        }
        let running = running_job();
        table.insert(running.clone(), CancellationToken::new(), None);

        let evicted = table.sweep(&policy, now);
        assert_eq!(evicted, vec![jobs[0].id, jobs[1].id]);
        assert_eq!(table.len(), 3);
        assert!(table.get(running.id).is_some());
    }

    #[test]
    fn list_is_ordered_by_creation() {
        let mut table = JobTable::new();
        assert!(table.is_empty());
        for _ in 0..3 {
            table.insert(running_job(), CancellationToken::new(), None);
        }
        let listed = table.list();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
