use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use drover_core::cluster::WorkerInfo;
use drover_core::config::DroverConfig;
use drover_core::error::{DroverError, Result};
use drover_core::job::{Collection, JobEntry, JobId, JobLogRecorder, QueueStats};
use drover_core::store::QueueStore;

/// Entries per page returned by [`QueueAdmin::list`].
pub const PAGE_SIZE: u64 = 10;

/// Collection sizes of one queue together with its concurrency limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub queue: String,
    pub concurrency: u32,
    #[serde(flatten)]
    pub stats: QueueStats,
}

/// Operator-facing view of queues and workers.
#[derive(Clone)]
pub struct QueueAdmin {
    store: Arc<dyn QueueStore>,
    logger: JobLogRecorder,
    cluster: String,
    concurrency: BTreeMap<String, u32>,
}

impl QueueAdmin {
    pub fn new(store: Arc<dyn QueueStore>, logger: JobLogRecorder, config: &DroverConfig) -> Self {
        let concurrency = config
            .queues
            .iter()
            .map(|(name, queue)| (name.clone(), queue.concurrency))
            .collect();

        Self {
            store,
            logger,
            cluster: config.cluster.name.clone(),
            concurrency,
        }
    }

    /// Remove one non-running entry.
    pub async fn delete(&self, queue: &str, collection: Collection, id: JobId) -> Result<()> {
        self.check_queue(queue)?;
        if collection == Collection::Running {
            return Err(DroverError::InvalidArgument(
                "Running jobs cannot be deleted".to_string(),
            ));
        }

        self.store.delete(queue, collection, id).await?;
        tracing::info!(queue = %queue, collection = %collection, job_id = %id, "Job deleted");
        Ok(())
    }

    /// Send a Failed or Done entry back to Pending with a fresh attempt count.
    pub async fn requeue(&self, queue: &str, collection: Collection, id: JobId) -> Result<()> {
        self.check_queue(queue)?;
        if !collection.is_terminal() {
            return Err(DroverError::InvalidArgument(format!(
                "Only failed or done jobs can be requeued, not {}",
                collection
            )));
        }

        self.store.requeue(queue, collection, id).await?;
        tracing::info!(queue = %queue, collection = %collection, job_id = %id, "Job requeued");
        Ok(())
    }

    pub async fn worker_count(&self) -> Result<usize> {
        self.store.worker_count(&self.cluster).await
    }

    pub async fn workers(&self) -> Result<Vec<WorkerInfo>> {
        self.store.workers(&self.cluster).await
    }

    pub async fn stats(&self, queue: &str) -> Result<QueueSummary> {
        let concurrency = self.check_queue(queue)?;
        let stats = self.store.stats(queue).await?;
        Ok(QueueSummary {
            queue: queue.to_string(),
            concurrency,
            stats,
        })
    }

    /// Summaries for every configured queue, by name.
    pub async fn all_stats(&self) -> Result<Vec<QueueSummary>> {
        let mut summaries = Vec::with_capacity(self.concurrency.len());
        for queue in self.concurrency.keys() {
            summaries.push(self.stats(queue).await?);
        }
        Ok(summaries)
    }

    /// One page of a collection, starting at entry `start`.
    pub async fn list(
        &self,
        queue: &str,
        collection: Collection,
        start: u64,
    ) -> Result<Vec<JobEntry>> {
        self.check_queue(queue)?;
        self.store.list(queue, collection, start, PAGE_SIZE).await
    }

    pub async fn find(&self, queue: &str, id: JobId) -> Result<Option<JobEntry>> {
        self.check_queue(queue)?;
        self.store.find(queue, id).await
    }

    pub async fn job_log(&self, log_id: &str) -> Result<String> {
        self.logger.read(log_id).await
    }

    fn check_queue(&self, queue: &str) -> Result<u32> {
        self.concurrency
            .get(queue)
            .copied()
            .ok_or_else(|| DroverError::NotFound(format!("Queue '{}' is not configured", queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::cluster::WorkerId;
    use drover_core::config::QueueConfig;
    use drover_core::job::Job;
    use drover_core::store::RunningGuard;
    use tokio_test::assert_ok;

    use crate::store::MemoryStore;

    fn setup() -> (QueueAdmin, Arc<MemoryStore>) {
        let mut config = DroverConfig::default();
        config.queues.insert(
            "render".to_string(),
            QueueConfig {
                concurrency: 2,
                max_attempts: 3,
                ..Default::default()
            },
        );
        config.queues.insert("email".to_string(), QueueConfig::default());

        let store = Arc::new(MemoryStore::new());
        let logger = JobLogRecorder::new(store.clone(), true);
        (QueueAdmin::new(store.clone(), logger, &config), store)
    }

    async fn fail_permanently(store: &MemoryStore, queue: &str) -> JobId {
        let worker = WorkerId::new();
        let id = store.enqueue(Job::new(queue, b"G".to_vec())).await.unwrap();
        for _ in 0..2 {
            store.dequeue(queue, worker, 1).await.unwrap().unwrap();
            store
                .requeue_from_running(queue, id, Some("boom".into()), None, RunningGuard::Owner(worker))
                .await
                .unwrap();
        }
        store.dequeue(queue, worker, 1).await.unwrap().unwrap();
        store
            .fail(queue, id, Some("boom".into()), RunningGuard::Owner(worker))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_requeue_failed_job_resets_attempts() {
        let (admin, store) = setup();
        let id = fail_permanently(&store, "render").await;

        let failed = admin.find("render", id).await.unwrap().unwrap();
        assert_eq!(failed.collection, Collection::Failed);
        assert_eq!(failed.job.attempts, 3);

        assert_ok!(admin.requeue("render", Collection::Failed, id).await);

        let entry = admin.find("render", id).await.unwrap().unwrap();
        assert_eq!(entry.collection, Collection::Pending);
        assert_eq!(entry.job.attempts, 0);
        assert_eq!(entry.job.payload, b"G");
    }

    #[tokio::test]
    async fn test_requeue_rejects_live_collections() {
        let (admin, store) = setup();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();

        let err = admin.requeue("render", Collection::Pending, id).await.unwrap_err();
        assert!(matches!(err, DroverError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_one() {
        let (admin, store) = setup();
        let mut ids = Vec::new();
        for i in 0..3u8 {
            ids.push(store.enqueue(Job::new("render", vec![i])).await.unwrap());
        }

        assert_ok!(admin.delete("render", Collection::Pending, ids[1]).await);

        let remaining: Vec<JobId> = admin
            .list("render", Collection::Pending, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.job.id)
            .collect();
        assert_eq!(remaining, vec![ids[0], ids[2]]);
    }

    #[tokio::test]
    async fn test_delete_wrong_collection_is_mismatch() {
        let (admin, store) = setup();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();

        let err = admin.delete("render", Collection::Done, id).await.unwrap_err();
        assert!(matches!(err, DroverError::IdentityMismatch { .. }));
        assert_eq!(admin.stats("render").await.unwrap().stats.pending, 1);
    }

    #[tokio::test]
    async fn test_delete_running_rejected() {
        let (admin, store) = setup();
        let id = store.enqueue(Job::new("render", Vec::new())).await.unwrap();
        store.dequeue("render", WorkerId::new(), 1).await.unwrap();

        let err = admin.delete("render", Collection::Running, id).await.unwrap_err();
        assert!(matches!(err, DroverError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_unknown_queue_not_found() {
        let (admin, _) = setup();
        assert!(matches!(admin.stats("video").await, Err(DroverError::NotFound(_))));
        assert!(matches!(
            admin.list("video", Collection::Pending, 0).await,
            Err(DroverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_all_stats_and_paging() {
        let (admin, store) = setup();
        for i in 0..12u8 {
            store.enqueue(Job::new("render", vec![i])).await.unwrap();
        }

        let summaries = admin.all_stats().await.unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.queue.as_str()).collect();
        assert_eq!(names, vec!["email", "render"]);
        assert_eq!(summaries[1].concurrency, 2);
        assert_eq!(summaries[1].stats.pending, 12);

        assert_eq!(admin.list("render", Collection::Pending, 0).await.unwrap().len(), 10);
        let tail = admin.list("render", Collection::Pending, 10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].job.payload, vec![11]);
    }

    #[tokio::test]
    async fn test_job_log_and_workers() {
        let (admin, store) = setup();
        store.append_log("abc", "hello\n").await.unwrap();
        assert_eq!(admin.job_log("abc").await.unwrap(), "hello\n");
        assert_eq!(admin.job_log("missing").await.unwrap(), "");

        let info = WorkerInfo::new_local("host-a", vec!["render".to_string()]);
        store.register_worker("default", &info).await.unwrap();
        assert_eq!(admin.worker_count().await.unwrap(), 1);
        assert_eq!(admin.workers().await.unwrap()[0].id, info.id);
    }
}
