//! Per-job pub/sub for job updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use studio_core::{JobId, JobUpdate};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the firehose channel returned by [`Broadcaster::subscribe_all`].
const FIREHOSE_CAPACITY: usize = 1024;

/// Identifies one subscription to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery failed because the receiving side is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscriber closed")]
pub struct SinkClosed;

/// Something that can receive job updates.
pub trait UpdateSink: Send + Sync + 'static {
    fn deliver(&self, update: &JobUpdate) -> Result<(), SinkClosed>;
}

impl UpdateSink for mpsc::UnboundedSender<JobUpdate> {
    fn deliver(&self, update: &JobUpdate) -> Result<(), SinkClosed> {
        self.send(update.clone()).map_err(|_| SinkClosed)
    }
}

type Subscribers = HashMap<JobId, Vec<(SubscriptionId, Arc<dyn UpdateSink>)>>;

/// Delivers each published update to the subscribers of its job.
///
/// Publishing happens from the scheduler actor only, so updates for one job
/// reach each subscriber in the order they were published.
pub struct Broadcaster {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    firehose: broadcast::Sender<JobUpdate>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (firehose, _) = broadcast::channel(FIREHOSE_CAPACITY);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            firehose,
        }
    }

    /// Register a sink for updates of one job.
    pub fn subscribe(&self, job_id: JobId, sink: Arc<dyn UpdateSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.entry(job_id).or_default().push((id, sink));
        tracing::debug!(job_id = %job_id, subscription = %id, "Subscribed");
        id
    }

    /// Subscribe an unbounded channel and return its receiving end.
    pub fn subscribe_channel(
        &self,
        job_id: JobId,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<JobUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.subscribe(job_id, Arc::new(tx)), rx)
    }

    /// Remove a subscription; false if it was not registered for that job.
    pub fn unsubscribe(&self, job_id: JobId, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let Some(sinks) = subscribers.get_mut(&job_id) else {
            return false;
        };
        let before = sinks.len();
        sinks.retain(|(sub, _)| *sub != id);
        let removed = sinks.len() != before;
        if sinks.is_empty() {
            subscribers.remove(&job_id);
        }
        removed
    }

    /// Deliver an update to every subscriber of its job.
    ///
    /// Sinks that fail are dropped; the rest still receive the update.
    pub fn publish(&self, update: &JobUpdate) {
        // No receivers is the normal case for the firehose.
        let _ = self.firehose.send(update.clone());

        let dead: Vec<SubscriptionId> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            let Some(sinks) = subscribers.get(&update.job_id) else {
                return;
            };
            sinks
                .iter()
                .filter(|(_, sink)| sink.deliver(update).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        for id in dead {
            tracing::debug!(
                job_id = %update.job_id,
                subscription = %id,
                "Dropping closed subscriber"
            );
            self.unsubscribe(update.job_id, id);
        }
    }

    /// Receive every update for every job.
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobUpdate> {
        self.firehose.subscribe()
    }

    /// Forget every subscription of a job.
    pub fn drop_job(&self, job_id: JobId) -> usize {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.remove(&job_id).map_or(0, |sinks| sinks.len())
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.get(&job_id).map_or(0, |sinks| sinks.len())
    }
}
