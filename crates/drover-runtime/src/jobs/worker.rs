use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use drover_core::cluster::WorkerId;
use drover_core::config::{DroverConfig, QueueConfig, WorkerConfig};
use drover_core::job::{Job, JobLogRecorder};
use drover_core::store::QueueStore;

use super::backoff::PollBackoff;
use super::executor::{ExecutionResult, JobExecutor};
use super::registry::JobRegistry;

/// Dispatch loop for one queue in this process.
pub struct QueueWorker {
    queue: String,
    concurrency: u32,
    worker_id: WorkerId,
    store: Arc<dyn QueueStore>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        queue: impl Into<String>,
        queue_config: &QueueConfig,
        worker_config: &WorkerConfig,
        worker_id: WorkerId,
        store: Arc<dyn QueueStore>,
        executor: JobExecutor,
    ) -> Self {
        Self {
            queue: queue.into(),
            concurrency: queue_config.concurrency.max(1),
            worker_id,
            store,
            executor: Arc::new(executor),
            config: worker_config.clone(),
        }
    }

    /// Run until `shutdown` fires, then drain in-flight jobs.
    pub async fn run(self, shutdown: CancellationToken) {
        // Local gate; the store's capped dequeue enforces the cluster-wide bound.
        let semaphore = Arc::new(Semaphore::new(self.concurrency as usize));
        let mut idle = PollBackoff::new(self.config.poll_interval(), self.config.max_poll_interval());
        let mut tasks = JoinSet::new();

        tracing::info!(
            queue = %self.queue,
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            "Queue worker started"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(queue = %self.queue, error = %e, "Job task panicked");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delay = match self
                .store
                .dequeue(&self.queue, self.worker_id, self.concurrency)
                .await
            {
                Ok(Some(job)) => {
                    idle.reset();
                    let executor = self.executor.clone();
                    let token = shutdown.clone();
                    tasks.spawn(async move {
                        tracing::debug!(queue = %job.queue, job_id = %job.id, "Processing job");
                        let result = executor.execute(&job, &token).await;
                        log_result(&job, &result);
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => idle.next_delay(),
                Err(e) if e.is_transient() => {
                    tracing::warn!(queue = %self.queue, error = %e, "Failed to dequeue");
                    idle.next_delay()
                }
                Err(e) => {
                    tracing::error!(queue = %self.queue, error = %e, "Dequeue failed permanently, backing off");
                    idle.next_delay()
                }
            };

            drop(permit);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(queue = %self.queue, in_flight = tasks.len(), "Queue worker draining");
        drain(&self.queue, tasks, self.config.drain_timeout()).await;
        tracing::info!(queue = %self.queue, "Queue worker stopped");
    }
}

fn log_result(job: &Job, result: &ExecutionResult) {
    match result {
        ExecutionResult::Completed => {
            tracing::info!(queue = %job.queue, job_id = %job.id, "Job completed");
        }
        ExecutionResult::Retrying { error, retry_at } => {
            tracing::warn!(
                queue = %job.queue,
                job_id = %job.id,
                error = %error,
                retry_at = ?retry_at,
                "Job failed, will retry"
            );
        }
        ExecutionResult::Failed { error } => {
            tracing::error!(
                queue = %job.queue,
                job_id = %job.id,
                error = %error,
                "Job failed permanently"
            );
        }
        ExecutionResult::Lost => {
            tracing::warn!(
                queue = %job.queue,
                job_id = %job.id,
                "Job was reclaimed before its outcome was recorded"
            );
        }
        ExecutionResult::Abandoned { error } => {
            tracing::warn!(
                queue = %job.queue,
                job_id = %job.id,
                error = %error,
                "Job outcome abandoned at shutdown"
            );
        }
    }
}

/// Wait up to `timeout` for in-flight jobs, then abort the rest.
async fn drain(queue: &str, mut tasks: JoinSet<()>, timeout: Duration) {
    let drained = tokio::time::timeout(timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            queue = %queue,
            abandoned = tasks.len(),
            "Drain timeout reached; abandoning in-flight jobs"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

/// All queue workers of this process.
pub struct WorkerPool {
    workers: Vec<QueueWorker>,
}

impl WorkerPool {
    /// Build one worker per configured queue that has a handler.
    pub fn new(
        config: &DroverConfig,
        registry: &JobRegistry,
        store: Arc<dyn QueueStore>,
        logger: JobLogRecorder,
        worker_id: WorkerId,
    ) -> Self {
        let mut workers = Vec::new();

        for (name, queue_config) in &config.queues {
            let Some(handler) = registry.get(name) else {
                tracing::warn!(queue = %name, "No handler registered; queue will not be served");
                continue;
            };

            let executor = JobExecutor::new(
                store.clone(),
                handler,
                logger.clone(),
                worker_id,
                queue_config,
                &config.worker,
            );
            workers.push(QueueWorker::new(
                name.clone(),
                queue_config,
                &config.worker,
                worker_id,
                store.clone(),
                executor,
            ));
        }

        for queue in registry.queues() {
            if !config.queues.contains_key(&queue) {
                tracing::warn!(queue = %queue, "Handler registered for unconfigured queue");
            }
        }

        Self { workers }
    }

    /// Names of the queues this pool serves.
    pub fn queues(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.queue.clone()).collect()
    }

    /// Run every queue worker until `shutdown` fires and they have drained.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut set = JoinSet::new();
        for worker in self.workers {
            set.spawn(worker.run(shutdown.clone()));
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Queue worker panicked");
            }
        }
    }
}
