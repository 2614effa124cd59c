//! Write-Behind Queue
//!
//! Bounded queue of deferred cache writes drained by a single background
//! task. Enqueueing never waits: a full queue rejects the write and the value
//! simply is not cached this time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheLevel, CacheStore, StatsCollector};
use crate::error::{CacheError, Result};

/// Called with the key and the failure when a deferred write does not land.
pub type ErrorCallback = Arc<dyn Fn(&str, &CacheError) + Send + Sync>;

/// A cache write waiting for the background worker.
pub struct WriteJob {
    pub key: String,
    pub value: Value,
    pub ttl: Duration,
    pub level: CacheLevel,
    pub on_error: Option<ErrorCallback>,
}

enum Command {
    Write(WriteJob),
    Flush(oneshot::Sender<()>),
}

/// Handle to the write-behind worker. Cloning shares the same queue.
#[derive(Clone)]
pub struct WriteBehindQueue {
    sender: mpsc::Sender<Command>,
    pending: Arc<AtomicUsize>,
}

impl WriteBehindQueue {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// The worker exits once every queue handle has been dropped.
    pub fn spawn(
        store: Arc<dyn CacheStore>,
        stats: Arc<StatsCollector>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(run_worker(receiver, store, stats, pending.clone()));
        info!(capacity, "Write-behind worker started");

        (Self { sender, pending }, handle)
    }

    /// Queues a write without waiting.
    pub fn enqueue(&self, job: WriteJob) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(Command::Write(job)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "write-behind queue is full",
                    mpsc::error::TrySendError::Closed(_) => "write-behind worker has stopped",
                };
                Err(CacheError::Internal(reason.to_string()))
            }
        }
    }

    /// Waits until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Writes queued but not yet attempted.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Command>,
    store: Arc<dyn CacheStore>,
    stats: Arc<StatsCollector>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Write(job) => {
                apply(&*store, &stats, job).await;
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Write-behind worker stopped");
}

async fn apply(store: &dyn CacheStore, stats: &StatsCollector, job: WriteJob) {
    let failure = match store.set(&job.key, job.value, job.ttl).await {
        Ok(true) => {
            stats.record_write(job.level);
            debug!(key = %job.key, level = %job.level, "Write-behind stored");
            return;
        }
        Ok(false) => CacheError::StoreUnavailable("store declined the write".to_string()),
        Err(e) => e,
    };

    stats.record_error(job.level);
    warn!(key = %job.key, level = %job.level, error = %failure, "Write-behind failed");
    if let Some(callback) = job.on_error {
        callback(&job.key, &failure);
    }
}
