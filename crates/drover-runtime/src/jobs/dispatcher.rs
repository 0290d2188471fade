use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use drover_core::error::{DroverError, Result};
use drover_core::job::{DroverJob, Job, JobId};
use drover_core::store::QueueStore;

/// Enqueues jobs onto configured queues.
#[derive(Clone)]
pub struct JobDispatcher {
    store: Arc<dyn QueueStore>,
    queues: Arc<HashSet<String>>,
}

impl JobDispatcher {
    /// Create a dispatcher accepting the given queue names.
    pub fn new(store: Arc<dyn QueueStore>, queues: impl IntoIterator<Item = String>) -> Self {
        Self {
            store,
            queues: Arc::new(queues.into_iter().collect()),
        }
    }

    /// Enqueue for immediate execution.
    pub async fn dispatch(&self, queue: &str, payload: impl Into<Vec<u8>>) -> Result<JobId> {
        self.enqueue(Job::new(self.check_queue(queue)?, payload))
            .await
    }

    /// Enqueue to run after `delay`, measured on the store clock.
    pub async fn dispatch_in(
        &self,
        queue: &str,
        delay: Duration,
        payload: impl Into<Vec<u8>>,
    ) -> Result<JobId> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| DroverError::InvalidArgument(format!("Invalid delay: {}", e)))?;
        let due = self.store.now().await? + delay;
        self.dispatch_at(queue, due, payload).await
    }

    /// Enqueue to run at `at`.
    pub async fn dispatch_at(
        &self,
        queue: &str,
        at: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<JobId> {
        let job = Job::new(self.check_queue(queue)?, payload).with_due_at(at);
        self.enqueue(job).await
    }

    /// Enqueue a JSON-encoded payload.
    pub async fn dispatch_json<T: Serialize>(&self, queue: &str, value: &T) -> Result<JobId> {
        let payload = serde_json::to_vec(value)?;
        self.dispatch(queue, payload).await
    }

    /// Enqueue a typed job on its own queue.
    pub async fn dispatch_job<J: DroverJob>(&self, args: J::Args) -> Result<JobId> {
        self.dispatch_json(J::queue(), &args).await
    }

    fn check_queue<'q>(&self, queue: &'q str) -> Result<&'q str> {
        if self.queues.contains(queue) {
            Ok(queue)
        } else {
            Err(DroverError::NotFound(format!(
                "Queue '{}' is not configured",
                queue
            )))
        }
    }

    async fn enqueue(&self, job: Job) -> Result<JobId> {
        let queue = job.queue.clone();
        let delayed = job.due_at.is_some();
        let id = self.store.enqueue(job).await?;

        tracing::debug!(queue = %queue, job_id = %id, delayed, "Job enqueued");
        Ok(id)
    }
}
