//! The shared-state contract every Drover component talks through.
//!
//! Each method is one atomic step against the store. Components never hold
//! locks of their own across calls; whatever must happen together is a
//! single method here.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::cluster::{WorkerId, WorkerInfo};
use crate::error::Result;
use crate::job::{Collection, Job, JobEntry, JobId, Lease, QueueStats};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Condition a running entry must satisfy before it may leave Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningGuard {
    /// The caller must still own the entry.
    Owner(WorkerId),
    /// The entry's heartbeat must still be older than the given time.
    StaleBefore(DateTime<Utc>),
}

impl RunningGuard {
    /// Check the guard against a lease.
    pub fn holds(&self, lease: &Lease) -> bool {
        match self {
            Self::Owner(worker) => lease.worker_id == *worker,
            Self::StaleBefore(cutoff) => lease.is_stale(*cutoff),
        }
    }
}

/// Atomic primitives over the shared queue state.
pub trait QueueStore: Send + Sync {
    /// Current time according to the store.
    fn now(&self) -> StoreFuture<'_, DateTime<Utc>>;

    /// Insert a new job into Pending, or into Delayed if it is not yet due.
    fn enqueue(&self, job: Job) -> StoreFuture<'_, JobId>;

    /// Move the head of Pending into Running, owned by `worker`.
    ///
    /// Returns `None` when Pending is empty or the queue already has
    /// `concurrency` running entries.
    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        worker: WorkerId,
        concurrency: u32,
    ) -> StoreFuture<'a, Option<Job>>;

    /// Refresh the heartbeat of a running entry owned by `worker`.
    ///
    /// Returns `false` when the entry is gone or owned by someone else.
    fn heartbeat<'a>(&'a self, queue: &'a str, id: JobId, worker: WorkerId)
        -> StoreFuture<'a, bool>;

    /// Move a running entry to Done.
    fn complete<'a>(&'a self, queue: &'a str, id: JobId, guard: RunningGuard)
        -> StoreFuture<'a, bool>;

    /// Move a running entry to Failed.
    fn fail<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool>;

    /// Move a running entry back to Pending, or to Delayed if `retry_at` is
    /// in the future.
    fn requeue_from_running<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        retry_at: Option<DateTime<Utc>>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool>;

    /// Move every delayed entry due at or before `now` into Pending.
    fn promote_due<'a>(&'a self, queue: &'a str, now: DateTime<Utc>) -> StoreFuture<'a, u64>;

    /// Remove one entry (and its log) from a non-running collection.
    fn delete<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()>;

    /// Move one Failed or Done entry back to Pending with its attempts reset.
    fn requeue<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()>;

    /// Collection sizes for a queue.
    fn stats<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, QueueStats>;

    /// Page through a collection in its natural order.
    fn list<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, Vec<JobEntry>>;

    /// Locate a job by id.
    fn find<'a>(&'a self, queue: &'a str, id: JobId) -> StoreFuture<'a, Option<JobEntry>>;

    /// All running entries of a queue, with their leases.
    fn running<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Vec<JobEntry>>;

    /// Delete the oldest Done/Failed entries beyond `keep`.
    fn trim_history<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        keep: u64,
    ) -> StoreFuture<'a, u64>;

    /// Insert or refresh a worker's registry entry; the store stamps the heartbeat.
    fn register_worker<'a>(&'a self, cluster: &'a str, info: &'a WorkerInfo)
        -> StoreFuture<'a, ()>;

    /// Remove a worker's registry entry.
    fn deregister_worker<'a>(&'a self, cluster: &'a str, id: WorkerId) -> StoreFuture<'a, ()>;

    /// Remove registry entries not refreshed since `seen_before`.
    fn prune_workers<'a>(
        &'a self,
        cluster: &'a str,
        seen_before: DateTime<Utc>,
    ) -> StoreFuture<'a, u64>;

    /// All registry entries of a cluster.
    fn workers<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, Vec<WorkerInfo>>;

    /// Number of registered workers.
    fn worker_count<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move { Ok(self.workers(cluster).await?.len()) })
    }

    /// Append text to a job log.
    fn append_log<'a>(&'a self, log_id: &'a str, text: &'a str) -> StoreFuture<'a, ()>;

    /// Read a job log.
    fn read_log<'a>(&'a self, log_id: &'a str) -> StoreFuture<'a, Option<String>>;
}
