use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use drover_core::clock::{Clock, SystemClock};
use drover_core::cluster::{WorkerId, WorkerInfo};
use drover_core::error::{DroverError, Result};
use drover_core::job::{Collection, Job, JobEntry, JobId, Lease, QueueStats};
use drover_core::store::{QueueStore, RunningGuard, StoreFuture};

/// Collections of one queue.
#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    /// In dequeue order.
    running: Vec<(Job, Lease)>,
    /// Keyed by due time, then insertion sequence.
    delayed: BTreeMap<(DateTime<Utc>, u64), Job>,
    /// Newest first.
    failed: VecDeque<Job>,
    /// Newest first.
    done: VecDeque<Job>,
}

impl QueueState {
    fn take_running(&mut self, id: JobId, guard: RunningGuard) -> Option<Job> {
        let idx = self
            .running
            .iter()
            .position(|(job, lease)| job.id == id && guard.holds(lease))?;
        Some(self.running.remove(idx).0)
    }

    fn finished_mut(&mut self, collection: Collection) -> Option<&mut VecDeque<Job>> {
        match collection {
            Collection::Failed => Some(&mut self.failed),
            Collection::Done => Some(&mut self.done),
            _ => None,
        }
    }

    fn remove(&mut self, collection: Collection, id: JobId) -> Option<Job> {
        fn take(list: &mut VecDeque<Job>, id: JobId) -> Option<Job> {
            let idx = list.iter().position(|job| job.id == id)?;
            list.remove(idx)
        }

        match collection {
            Collection::Pending => take(&mut self.pending, id),
            Collection::Failed => take(&mut self.failed, id),
            Collection::Done => take(&mut self.done, id),
            Collection::Delayed => {
                let key = *self.delayed.iter().find(|(_, job)| job.id == id)?.0;
                self.delayed.remove(&key)
            }
            Collection::Running => None,
        }
    }

    fn entries(&self, collection: Collection) -> Vec<JobEntry> {
        let plain = |job: &Job| JobEntry {
            collection,
            job: job.clone(),
            lease: None,
        };

        match collection {
            Collection::Pending => self.pending.iter().map(plain).collect(),
            Collection::Delayed => self.delayed.values().map(plain).collect(),
            Collection::Failed => self.failed.iter().map(plain).collect(),
            Collection::Done => self.done.iter().map(plain).collect(),
            Collection::Running => self
                .running
                .iter()
                .map(|(job, lease)| JobEntry {
                    collection,
                    job: job.clone(),
                    lease: Some(*lease),
                })
                .collect(),
        }
    }

    fn contains(&self, id: JobId) -> bool {
        self.pending.iter().any(|job| job.id == id)
            || self.running.iter().any(|(job, _)| job.id == id)
            || self.delayed.values().any(|job| job.id == id)
            || self.failed.iter().any(|job| job.id == id)
            || self.done.iter().any(|job| job.id == id)
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len() as u64,
            running: self.running.len() as u64,
            delayed: self.delayed.len() as u64,
            failed: self.failed.len() as u64,
            done: self.done.len() as u64,
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, QueueState>,
    workers: HashMap<String, HashMap<WorkerId, WorkerInfo>>,
    logs: HashMap<String, String>,
    seq: u64,
}

impl State {
    fn queue(&mut self, name: &str) -> &mut QueueState {
        self.queues.entry(name.to_string()).or_default()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Job ids are unique across every queue, as with the PostgreSQL primary key.
    fn contains(&self, id: JobId) -> bool {
        self.queues.values().any(|q| q.contains(id))
    }

    /// Place a job in Pending, or in Delayed when `due_at` is after `now`.
    fn schedule(&mut self, mut job: Job, now: DateTime<Utc>) {
        match job.due_at {
            Some(due) if !job.is_due(now) => {
                let seq = self.next_seq();
                self.queue(&job.queue.clone()).delayed.insert((due, seq), job);
            }
            _ => {
                job.due_at = None;
                self.queue(&job.queue.clone()).pending.push_back(job);
            }
        }
    }
}

/// Process-local store; every operation is one critical section.
///
/// Ordering matches the PostgreSQL store, so either can back the same tests.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for MemoryStore {
    fn now(&self) -> StoreFuture<'_, DateTime<Utc>> {
        Box::pin(async move { Ok(self.clock.now()) })
    }

    fn enqueue(&self, job: Job) -> StoreFuture<'_, JobId> {
        Box::pin(async move {
            if job.queue.is_empty() {
                return Err(DroverError::InvalidArgument(
                    "Job queue name must not be empty".into(),
                ));
            }

            let id = job.id;
            let now = self.clock.now();
            let mut state = self.state.lock().await;
            if state.contains(id) {
                return Err(DroverError::InvalidArgument(format!("Job {} already exists", id)));
            }
            state.schedule(job, now);
            Ok(id)
        })
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        worker: WorkerId,
        concurrency: u32,
    ) -> StoreFuture<'a, Option<Job>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = self.state.lock().await;
            let q = state.queue(queue);

            if q.running.len() >= concurrency as usize {
                return Ok(None);
            }
            let Some(job) = q.pending.pop_front() else {
                return Ok(None);
            };

            let lease = Lease {
                worker_id: worker,
                heartbeat_at: now,
            };
            q.running.push((job.clone(), lease));
            Ok(Some(job))
        })
    }

    fn heartbeat<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        worker: WorkerId,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = self.state.lock().await;
            let entry = state
                .queue(queue)
                .running
                .iter_mut()
                .find(|(job, lease)| job.id == id && lease.worker_id == worker);

            match entry {
                Some((_, lease)) => {
                    lease.heartbeat_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn complete<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let Some(mut job) = q.take_running(id, guard) else {
                return Ok(false);
            };

            job.attempts += 1;
            q.done.push_front(job);
            Ok(true)
        })
    }

    fn fail<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let Some(mut job) = q.take_running(id, guard) else {
                return Ok(false);
            };

            job.attempts += 1;
            if error.is_some() {
                job.last_error = error;
            }
            q.failed.push_front(job);
            Ok(true)
        })
    }

    fn requeue_from_running<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        retry_at: Option<DateTime<Utc>>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = self.state.lock().await;
            let Some(mut job) = state.queue(queue).take_running(id, guard) else {
                return Ok(false);
            };

            job.attempts += 1;
            if error.is_some() {
                job.last_error = error;
            }
            job.due_at = retry_at;
            state.schedule(job, now);
            Ok(true)
        })
    }

    fn promote_due<'a>(&'a self, queue: &'a str, now: DateTime<Utc>) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let mut promoted = 0;

            while let Some(entry) = q.delayed.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                q.pending.push_back(entry.remove());
                promoted += 1;
            }

            Ok(promoted)
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if collection == Collection::Running {
                return Err(DroverError::InvalidArgument(
                    "Running entries cannot be deleted".into(),
                ));
            }

            let mut state = self.state.lock().await;
            let job = state.queue(queue).remove(collection, id).ok_or_else(|| {
                DroverError::IdentityMismatch {
                    queue: queue.to_string(),
                    collection,
                    job_id: id,
                }
            })?;
            state.logs.remove(&job.log_id);
            Ok(())
        })
    }

    fn requeue<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !collection.is_terminal() {
                return Err(DroverError::InvalidArgument(format!(
                    "Only failed or done entries can be requeued, not {}",
                    collection
                )));
            }

            let mut state = self.state.lock().await;
            let q = state.queue(queue);
            let mut job = q.remove(collection, id).ok_or_else(|| {
                DroverError::IdentityMismatch {
                    queue: queue.to_string(),
                    collection,
                    job_id: id,
                }
            })?;

            job.attempts = 0;
            job.last_error = None;
            job.due_at = None;
            q.pending.push_back(job);
            Ok(())
        })
    }

    fn stats<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, QueueStats> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .queues
                .get(queue)
                .map(QueueState::stats)
                .unwrap_or_default())
        })
    }

    fn list<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, Vec<JobEntry>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let Some(q) = state.queues.get(queue) else {
                return Ok(Vec::new());
            };

            Ok(q.entries(collection)
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        })
    }

    fn find<'a>(&'a self, queue: &'a str, id: JobId) -> StoreFuture<'a, Option<JobEntry>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let Some(q) = state.queues.get(queue) else {
                return Ok(None);
            };

            Ok(Collection::ALL
                .into_iter()
                .flat_map(|c| q.entries(c))
                .find(|entry| entry.job.id == id))
        })
    }

    fn running<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Vec<JobEntry>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .queues
                .get(queue)
                .map(|q| q.entries(Collection::Running))
                .unwrap_or_default())
        })
    }

    fn trim_history<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        keep: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let list = state.queue(queue).finished_mut(collection).ok_or_else(|| {
                DroverError::InvalidArgument(format!("Cannot trim {} entries", collection))
            })?;

            if list.len() as u64 <= keep {
                return Ok(0);
            }
            let trimmed: Vec<Job> = list.drain(keep as usize..).collect();
            for job in &trimmed {
                state.logs.remove(&job.log_id);
            }

            Ok(trimmed.len() as u64)
        })
    }

    fn register_worker<'a>(
        &'a self,
        cluster: &'a str,
        info: &'a WorkerInfo,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut entry = info.clone();
            entry.last_heartbeat = self.clock.now();

            let mut state = self.state.lock().await;
            state
                .workers
                .entry(cluster.to_string())
                .or_default()
                .insert(entry.id, entry);
            Ok(())
        })
    }

    fn deregister_worker<'a>(&'a self, cluster: &'a str, id: WorkerId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(workers) = state.workers.get_mut(cluster) {
                workers.remove(&id);
            }
            Ok(())
        })
    }

    fn prune_workers<'a>(
        &'a self,
        cluster: &'a str,
        seen_before: DateTime<Utc>,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(workers) = state.workers.get_mut(cluster) else {
                return Ok(0);
            };

            let before = workers.len();
            workers.retain(|_, w| w.last_heartbeat >= seen_before);
            Ok((before - workers.len()) as u64)
        })
    }

    fn workers<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, Vec<WorkerInfo>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut workers: Vec<WorkerInfo> = state
                .workers
                .get(cluster)
                .map(|w| w.values().cloned().collect())
                .unwrap_or_default();
            workers.sort_by_key(|w| (w.started_at, w.id.as_uuid()));
            Ok(workers)
        })
    }

    fn append_log<'a>(&'a self, log_id: &'a str, text: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state
                .logs
                .entry(log_id.to_string())
                .or_default()
                .push_str(text);
            Ok(())
        })
    }

    fn read_log<'a>(&'a self, log_id: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.logs.get(log_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use drover_core::clock::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    async fn collections_containing(store: &MemoryStore, queue: &str, id: JobId) -> usize {
        let mut count = 0;
        for collection in Collection::ALL {
            let entries = store.list(queue, collection, 0, u64::MAX).await.unwrap();
            count += entries.iter().filter(|e| e.job.id == id).count();
        }
        count
    }

    #[tokio::test]
    async fn test_enqueue_immediate_and_delayed() {
        let (store, clock) = store();
        let now = clock.now();

        store.enqueue(Job::new("render", b"a".to_vec())).await.unwrap();
        store
            .enqueue(Job::new("render", b"b".to_vec()).with_due_at(now + Duration::seconds(5)))
            .await
            .unwrap();
        store
            .enqueue(Job::new("render", b"c".to_vec()).with_due_at(now))
            .await
            .unwrap();

        let stats = store.stats("render").await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.delayed, 1);
        assert!(store.enqueue(Job::new("", Vec::new())).await.is_err());
    }

    #[tokio::test]
    async fn test_job_log_stamped_with_store_clock() {
        use chrono::TimeZone;
        use drover_core::job::JobLogRecorder;

        let (store, clock) = store();
        clock.set(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap());
        let recorder = JobLogRecorder::new(Arc::new(store.clone()), true);

        recorder.append("log-1", 1, WorkerId::new(), "started").await.unwrap();
        clock.advance(Duration::seconds(30));
        recorder.append("log-1", 1, WorkerId::new(), "error: heartbeat timeout").await.unwrap();

        let log = store.read_log("log-1").await.unwrap().unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert!(lines[0].starts_with("[2020-01-02T03:04:05.000Z attempt=1"));
        assert!(lines[1].starts_with("[2020-01-02T03:04:35.000Z attempt=1"));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate_id() {
        let (store, _clock) = store();
        let job = Job::new("render", b"a".to_vec());

        store.enqueue(job.clone()).await.unwrap();
        let err = store.enqueue(job.clone()).await.unwrap_err();
        assert!(matches!(err, DroverError::InvalidArgument(_)));
        assert_eq!(collections_containing(&store, "render", job.id).await, 1);
        assert_eq!(store.stats("render").await.unwrap().pending, 1);

        let mut moved = job.clone();
        moved.queue = "email".to_string();
        assert!(store.enqueue(moved).await.is_err());

        store.dequeue("render", WorkerId::new(), 1).await.unwrap().unwrap();
        assert!(store.enqueue(job.clone()).await.is_err());
        assert_eq!(collections_containing(&store, "render", job.id).await, 1);
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo_and_preserves_payload() {
        let (store, _) = store();
        let worker = WorkerId::new();
        let a = store.enqueue(Job::new("render", b"a".to_vec())).await.unwrap();
        let b = store.enqueue(Job::new("render", b"b".to_vec())).await.unwrap();

        let first = store.dequeue("render", worker, 10).await.unwrap().unwrap();
        let second = store.dequeue("render", worker, 10).await.unwrap().unwrap();

        assert_eq!((first.id, second.id), (a, b));
        assert_eq!(first.payload, b"a");
        assert!(store.dequeue("render", worker, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_respects_concurrency_cap() {
        let (store, _) = store();
        for payload in [b"a", b"b", b"c"] {
            store.enqueue(Job::new("render", payload.to_vec())).await.unwrap();
        }

        // Two dispatchers share the cap.
        let (w1, w2) = (WorkerId::new(), WorkerId::new());
        let first = store.dequeue("render", w1, 2).await.unwrap().unwrap();
        assert!(store.dequeue("render", w2, 2).await.unwrap().is_some());
        assert!(store.dequeue("render", w2, 2).await.unwrap().is_none());

        let stats = store.stats("render").await.unwrap();
        assert_eq!((stats.running, stats.pending), (2, 1));

        assert!(store
            .complete("render", first.id, RunningGuard::Owner(w1))
            .await
            .unwrap());
        assert!(store.dequeue("render", w2, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_running_guard_owner() {
        let (store, _) = store();
        let owner = WorkerId::new();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", owner, 1).await.unwrap();

        let zombie = RunningGuard::Owner(WorkerId::new());
        assert!(!store.complete("render", id, zombie).await.unwrap());
        assert!(!store.heartbeat("render", id, WorkerId::new()).await.unwrap());
        assert!(store.heartbeat("render", id, owner).await.unwrap());
        assert!(store.complete("render", id, RunningGuard::Owner(owner)).await.unwrap());

        let done = store.find("render", id).await.unwrap().unwrap();
        assert_eq!(done.collection, Collection::Done);
        assert_eq!(done.job.attempts, 1);
        assert!(!store.complete("render", id, RunningGuard::Owner(owner)).await.unwrap());
    }

    #[tokio::test]
    async fn test_running_guard_stale_before() {
        let (store, clock) = store();
        let owner = WorkerId::new();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", owner, 1).await.unwrap();

        clock.advance(Duration::seconds(31));
        let cutoff = clock.now() - Duration::seconds(30);

        // A heartbeat after the scan wins over the reclaim.
        store.heartbeat("render", id, owner).await.unwrap();
        let guard = RunningGuard::StaleBefore(cutoff);
        assert!(!store
            .requeue_from_running("render", id, None, None, guard)
            .await
            .unwrap());
        assert_eq!(store.stats("render").await.unwrap().running, 1);
    }

    #[tokio::test]
    async fn test_requeue_from_running_with_backoff() {
        let (store, clock) = store();
        let owner = WorkerId::new();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", owner, 1).await.unwrap();

        let retry_at = clock.now() + Duration::seconds(2);
        assert!(store
            .requeue_from_running(
                "render",
                id,
                Some("boom".into()),
                Some(retry_at),
                RunningGuard::Owner(owner),
            )
            .await
            .unwrap());

        let entry = store.find("render", id).await.unwrap().unwrap();
        assert_eq!(entry.collection, Collection::Delayed);
        assert_eq!(entry.job.attempts, 1);
        assert_eq!(entry.job.last_error.as_deref(), Some("boom"));
        assert_eq!(entry.job.due_at, Some(retry_at));
        assert_eq!(collections_containing(&store, "render", id).await, 1);
    }

    #[tokio::test]
    async fn test_requeue_from_running_past_retry_goes_pending() {
        let (store, clock) = store();
        let owner = WorkerId::new();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", owner, 1).await.unwrap();

        store
            .requeue_from_running("render", id, None, Some(clock.now()), RunningGuard::Owner(owner))
            .await
            .unwrap();

        let entry = store.find("render", id).await.unwrap().unwrap();
        assert_eq!(entry.collection, Collection::Pending);
        assert!(entry.job.due_at.is_none());
    }

    #[tokio::test]
    async fn test_promote_due_moves_once() {
        let (store, clock) = store();
        let due = clock.now() + Duration::seconds(5);
        let id = store
            .enqueue(Job::new("render", b"d".to_vec()).with_due_at(due))
            .await
            .unwrap();

        assert_eq!(store.promote_due("render", clock.now()).await.unwrap(), 0);
        assert_eq!(store.stats("render").await.unwrap().pending, 0);

        clock.advance(Duration::seconds(5));
        assert_eq!(store.promote_due("render", clock.now()).await.unwrap(), 1);
        assert_eq!(store.promote_due("render", clock.now()).await.unwrap(), 0);

        let pending = store.list("render", Collection::Pending, 0, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job.id, id);
    }

    #[tokio::test]
    async fn test_delayed_ordering_by_due_time() {
        let (store, clock) = store();
        let now = clock.now();
        let late = store
            .enqueue(Job::new("render", Vec::new()).with_due_at(now + Duration::seconds(9)))
            .await
            .unwrap();
        let early = store
            .enqueue(Job::new("render", Vec::new()).with_due_at(now + Duration::seconds(3)))
            .await
            .unwrap();

        let delayed = store.list("render", Collection::Delayed, 0, 10).await.unwrap();
        let ids: Vec<JobId> = delayed.iter().map(|e| e.job.id).collect();
        assert_eq!(ids, vec![early, late]);
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_one_entry() {
        let (store, _) = store();
        let keep = store.enqueue(Job::new("render", b"same".to_vec())).await.unwrap();
        let target = store.enqueue(Job::new("render", b"same".to_vec())).await.unwrap();
        store.append_log("log-x", "line\n").await.unwrap();

        store.delete("render", Collection::Pending, target).await.unwrap();

        let pending = store.list("render", Collection::Pending, 0, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job.id, keep);
        assert_eq!(store.read_log("log-x").await.unwrap().as_deref(), Some("line\n"));
    }

    #[tokio::test]
    async fn test_delete_mismatch_mutates_nothing() {
        let (store, _) = store();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();

        let err = store
            .delete("render", Collection::Failed, id)
            .await
            .unwrap_err();
        assert!(matches!(err, DroverError::IdentityMismatch { .. }));
        assert!(store.delete("render", Collection::Running, id).await.is_err());
        assert_eq!(store.stats("render").await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_delete_drops_job_log() {
        let (store, _) = store();
        let job = Job::new("render", Vec::new());
        let log_id = job.log_id.clone();
        let id = store.enqueue(job).await.unwrap();
        store.append_log(&log_id, "hello\n").await.unwrap();

        store.delete("render", Collection::Pending, id).await.unwrap();
        assert!(store.read_log(&log_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_admin_requeue_resets_attempts() {
        let (store, _) = store();
        let owner = WorkerId::new();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", owner, 1).await.unwrap();
        store
            .fail("render", id, Some("bad".into()), RunningGuard::Owner(owner))
            .await
            .unwrap();

        assert!(store.requeue("render", Collection::Pending, id).await.is_err());
        tokio_test::assert_ok!(store.requeue("render", Collection::Failed, id).await);

        let entry = store.find("render", id).await.unwrap().unwrap();
        assert_eq!(entry.collection, Collection::Pending);
        assert_eq!(entry.job.attempts, 0);
        assert!(entry.job.last_error.is_none());
        assert_eq!(store.stats("render").await.unwrap().failed, 0);
    }

    #[tokio::test]
    async fn test_finished_lists_newest_first() {
        let (store, _) = store();
        let owner = WorkerId::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
            store.dequeue("render", owner, 1).await.unwrap();
            store.complete("render", id, RunningGuard::Owner(owner)).await.unwrap();
            ids.push(id);
        }

        let done = store.list("render", Collection::Done, 0, 10).await.unwrap();
        let listed: Vec<JobId> = done.iter().map(|e| e.job.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);

        let page = store.list("render", Collection::Done, 1, 1).await.unwrap();
        assert_eq!(page[0].job.id, ids[1]);
    }

    #[tokio::test]
    async fn test_trim_history_keeps_newest() {
        let (store, _) = store();
        let owner = WorkerId::new();
        let mut logs = Vec::new();
        for _ in 0..5 {
            let job = Job::new("render", Vec::new());
            logs.push(job.log_id.clone());
            let id = store.enqueue(job).await.unwrap();
            store.append_log(logs.last().unwrap(), "x\n").await.unwrap();
            store.dequeue("render", owner, 1).await.unwrap();
            store.complete("render", id, RunningGuard::Owner(owner)).await.unwrap();
        }

        assert_eq!(store.trim_history("render", Collection::Done, 2).await.unwrap(), 3);
        assert_eq!(store.stats("render").await.unwrap().done, 2);
        assert!(store.read_log(&logs[0]).await.unwrap().is_none());
        assert!(store.read_log(&logs[4]).await.unwrap().is_some());
        assert!(store.trim_history("render", Collection::Pending, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_worker_registry() {
        let (store, clock) = store();
        let a = WorkerInfo::new_local("host-a", vec!["render".into()]);
        let b = WorkerInfo::new_local("host-b", vec!["render".into()]);

        store.register_worker("prod", &a).await.unwrap();
        clock.advance(Duration::seconds(20));
        store.register_worker("prod", &b).await.unwrap();
        store.register_worker("staging", &a).await.unwrap();
        assert_eq!(store.worker_count("prod").await.unwrap(), 2);

        let pruned = store
            .prune_workers("prod", clock.now() - Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(pruned, 1);

        let left = store.workers("prod").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, b.id);

        store.deregister_worker("prod", b.id).await.unwrap();
        assert_eq!(store.worker_count("prod").await.unwrap(), 0);
        assert_eq!(store.worker_count("staging").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_log_append_accumulates() {
        let (store, _) = store();
        assert!(store.read_log("abc").await.unwrap().is_none());

        store.append_log("abc", "one\n").await.unwrap();
        store.append_log("abc", "two\n").await.unwrap();
        assert_eq!(store.read_log("abc").await.unwrap().as_deref(), Some("one\ntwo\n"));
    }

    #[tokio::test]
    async fn test_unknown_queue_reads_are_empty() {
        let (store, _) = store();
        assert_eq!(store.stats("nope").await.unwrap().total(), 0);
        assert!(store.list("nope", Collection::Pending, 0, 10).await.unwrap().is_empty());
        assert!(store.running("nope").await.unwrap().is_empty());
        assert!(store.find("nope", JobId::new()).await.unwrap().is_none());
    }
}
