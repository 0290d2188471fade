use std::sync::Mutex;

use chrono::{DateTime, Utc};

use drover_core::cluster::{WorkerId, WorkerInfo};
use drover_core::error::DroverError;
use drover_core::job::{Collection, Job, JobEntry, JobId, QueueStats};
use drover_core::store::{QueueStore, RunningGuard, StoreFuture};

use super::MemoryStore;

/// Memory store that returns queued errors from `dequeue` and `complete`.
pub struct FaultyStore {
    pub inner: MemoryStore,
    dequeue_errors: Mutex<Vec<DroverError>>,
    complete_errors: Mutex<Vec<DroverError>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            dequeue_errors: Mutex::new(Vec::new()),
            complete_errors: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `dequeue` calls, in order.
    pub fn fail_dequeue(&self, errors: Vec<DroverError>) {
        push(&self.dequeue_errors, errors);
    }

    /// Fail the next `complete` calls, in order.
    pub fn fail_complete(&self, errors: Vec<DroverError>) {
        push(&self.complete_errors, errors);
    }

    pub fn pending_dequeue_errors(&self) -> usize {
        self.dequeue_errors.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn pending_complete_errors(&self) -> usize {
        self.complete_errors.lock().map(|e| e.len()).unwrap_or(0)
    }
}

fn push(slot: &Mutex<Vec<DroverError>>, mut errors: Vec<DroverError>) {
    errors.reverse();
    slot.lock().unwrap().extend(errors);
}

fn take(slot: &Mutex<Vec<DroverError>>) -> Option<DroverError> {
    slot.lock().unwrap().pop()
}

impl QueueStore for FaultyStore {
    fn now(&self) -> StoreFuture<'_, DateTime<Utc>> {
        self.inner.now()
    }

    fn enqueue(&self, job: Job) -> StoreFuture<'_, JobId> {
        self.inner.enqueue(job)
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        worker: WorkerId,
        concurrency: u32,
    ) -> StoreFuture<'a, Option<Job>> {
        match take(&self.dequeue_errors) {
            Some(e) => Box::pin(async move { Err(e) }),
            None => self.inner.dequeue(queue, worker, concurrency),
        }
    }

    fn heartbeat<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        worker: WorkerId,
    ) -> StoreFuture<'a, bool> {
        self.inner.heartbeat(queue, id, worker)
    }

    fn complete<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        match take(&self.complete_errors) {
            Some(e) => Box::pin(async move { Err(e) }),
            None => self.inner.complete(queue, id, guard),
        }
    }

    fn fail<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        self.inner.fail(queue, id, error, guard)
    }

    fn requeue_from_running<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        retry_at: Option<DateTime<Utc>>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        self.inner.requeue_from_running(queue, id, error, retry_at, guard)
    }

    fn promote_due<'a>(&'a self, queue: &'a str, now: DateTime<Utc>) -> StoreFuture<'a, u64> {
        self.inner.promote_due(queue, now)
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        self.inner.delete(queue, collection, id)
    }

    fn requeue<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        self.inner.requeue(queue, collection, id)
    }

    fn stats<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, QueueStats> {
        self.inner.stats(queue)
    }

    fn list<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, Vec<JobEntry>> {
        self.inner.list(queue, collection, offset, limit)
    }

    fn find<'a>(&'a self, queue: &'a str, id: JobId) -> StoreFuture<'a, Option<JobEntry>> {
        self.inner.find(queue, id)
    }

    fn running<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Vec<JobEntry>> {
        self.inner.running(queue)
    }

    fn trim_history<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        keep: u64,
    ) -> StoreFuture<'a, u64> {
        self.inner.trim_history(queue, collection, keep)
    }

    fn register_worker<'a>(
        &'a self,
        cluster: &'a str,
        info: &'a WorkerInfo,
    ) -> StoreFuture<'a, ()> {
        self.inner.register_worker(cluster, info)
    }

    fn deregister_worker<'a>(&'a self, cluster: &'a str, id: WorkerId) -> StoreFuture<'a, ()> {
        self.inner.deregister_worker(cluster, id)
    }

    fn prune_workers<'a>(
        &'a self,
        cluster: &'a str,
        seen_before: DateTime<Utc>,
    ) -> StoreFuture<'a, u64> {
        self.inner.prune_workers(cluster, seen_before)
    }

    fn workers<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, Vec<WorkerInfo>> {
        self.inner.workers(cluster)
    }

    fn append_log<'a>(&'a self, log_id: &'a str, text: &'a str) -> StoreFuture<'a, ()> {
        self.inner.append_log(log_id, text)
    }

    fn read_log<'a>(&'a self, log_id: &'a str) -> StoreFuture<'a, Option<String>> {
        self.inner.read_log(log_id)
    }
}
