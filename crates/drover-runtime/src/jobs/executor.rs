use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use drover_core::cluster::WorkerId;
use drover_core::config::{QueueConfig, WorkerConfig};
use drover_core::error::{DroverError, Result};
use drover_core::job::{Job, JobContext, JobHandler, JobLogRecorder, RetryConfig};
use drover_core::store::{QueueStore, RunningGuard};

use super::backoff::PollBackoff;

/// What the handler outcome asks the store to do with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transition {
    Complete,
    Retry {
        error: String,
        delay: Option<Duration>,
    },
    Fail {
        error: String,
    },
}

/// Runs dequeued jobs of one queue and records their outcome.
pub struct JobExecutor {
    store: Arc<dyn QueueStore>,
    handler: Arc<dyn JobHandler>,
    logger: JobLogRecorder,
    worker_id: WorkerId,
    retry: RetryConfig,
    timeout: Option<Duration>,
    heartbeat_interval: Duration,
    poll_interval: Duration,
    max_poll_interval: Duration,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        store: Arc<dyn QueueStore>,
        handler: Arc<dyn JobHandler>,
        logger: JobLogRecorder,
        worker_id: WorkerId,
        queue: &QueueConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            handler,
            logger,
            worker_id,
            retry: queue.retry(),
            timeout: queue.timeout(),
            heartbeat_interval: worker.job_heartbeat_interval(),
            poll_interval: worker.poll_interval(),
            max_poll_interval: worker.max_poll_interval(),
        }
    }

    /// Execute a job this worker owns and move it out of Running.
    pub async fn execute(&self, job: &Job, shutdown: &CancellationToken) -> ExecutionResult {
        let ctx = JobContext::new(
            job,
            self.retry.max_attempts,
            self.worker_id,
            self.logger.clone(),
        );

        let outcome = {
            let run = self.run_handler(&ctx, &job.payload);
            let ticker = self.keep_alive(job);
            tokio::pin!(run);
            tokio::pin!(ticker);

            loop {
                tokio::select! {
                    biased;
                    result = &mut run => break result,
                    _ = &mut ticker => {}
                }
            }
        };

        let transition = self.decide(ctx.attempt, outcome);
        if let Transition::Retry { error, .. } | Transition::Fail { error } = &transition {
            if let Err(e) = ctx.log(format!("error: {}", error)).await {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to write job log");
            }
        }

        self.finish(job, transition, shutdown).await
    }

    async fn run_handler(&self, ctx: &JobContext, payload: &[u8]) -> Result<()> {
        let handle = self.handler.handle(ctx, payload);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(result) => result,
                Err(_) => Err(DroverError::Timeout(format!(
                    "Job timed out after {:?}",
                    limit
                ))),
            },
            None => handle.await,
        }
    }

    /// Refresh the job's heartbeat until ownership is lost, then idle.
    async fn keep_alive(&self, job: &Job) {
        loop {
            tokio::time::sleep(self.heartbeat_interval).await;

            match self.store.heartbeat(&job.queue, job.id, self.worker_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        queue = %job.queue,
                        job_id = %job.id,
                        "Job no longer owned by this worker; heartbeat stopped"
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(queue = %job.queue, job_id = %job.id, error = %e, "Heartbeat failed");
                }
            }
        }

        std::future::pending::<()>().await
    }

    fn decide(&self, attempt: u32, outcome: Result<()>) -> Transition {
        match outcome {
            Ok(()) => Transition::Complete,
            Err(e) if !e.is_retryable_job_error() => Transition::Fail {
                error: e.to_string(),
            },
            Err(e) if self.retry.should_retry(attempt) => Transition::Retry {
                error: e.to_string(),
                delay: self.retry.calculate_backoff(attempt),
            },
            Err(e) => Transition::Fail {
                error: e.to_string(),
            },
        }
    }

    /// Apply the transition, retrying transient store errors until shutdown.
    ///
    /// A permanent error gives up at once; the job stays Running until the
    /// monitor reclaims it.
    async fn finish(
        &self,
        job: &Job,
        transition: Transition,
        shutdown: &CancellationToken,
    ) -> ExecutionResult {
        let mut backoff = PollBackoff::new(self.poll_interval, self.max_poll_interval);

        loop {
            match self.apply(job, &transition).await {
                Ok(Some(result)) => return result,
                Ok(None) => return ExecutionResult::Lost,
                Err(e) if !e.is_transient() => {
                    tracing::error!(
                        queue = %job.queue,
                        job_id = %job.id,
                        error = %e,
                        "Failed to record job outcome; leaving it for the monitor"
                    );
                    return ExecutionResult::Abandoned { error: e.to_string() };
                }
                Err(e) => {
                    tracing::warn!(
                        queue = %job.queue,
                        job_id = %job.id,
                        error = %e,
                        "Failed to record job outcome, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            return ExecutionResult::Abandoned { error: e.to_string() };
                        }
                        _ = tokio::time::sleep(backoff.next_delay()) => {}
                    }
                }
            }
        }
    }

    /// One attempt at the store call; `None` if the guard no longer holds.
    async fn apply(&self, job: &Job, transition: &Transition) -> Result<Option<ExecutionResult>> {
        let guard = RunningGuard::Owner(self.worker_id);

        let (applied, result) = match transition {
            Transition::Complete => {
                let applied = self.store.complete(&job.queue, job.id, guard).await?;
                (applied, ExecutionResult::Completed)
            }
            Transition::Fail { error } => {
                let applied = self
                    .store
                    .fail(&job.queue, job.id, Some(error.clone()), guard)
                    .await?;
                (applied, ExecutionResult::Failed { error: error.clone() })
            }
            Transition::Retry { error, delay } => {
                let retry_at = match delay {
                    Some(delay) => Some(retry_time(self.store.now().await?, *delay)),
                    None => None,
                };
                let applied = self
                    .store
                    .requeue_from_running(&job.queue, job.id, Some(error.clone()), retry_at, guard)
                    .await?;
                (
                    applied,
                    ExecutionResult::Retrying {
                        error: error.clone(),
                        retry_at,
                    },
                )
            }
        };

        Ok(applied.then_some(result))
    }
}

fn retry_time(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Moved to Done.
    Completed,
    /// Moved back to Pending, or to Delayed until `retry_at`.
    Retrying {
        error: String,
        retry_at: Option<DateTime<Utc>>,
    },
    /// Moved to Failed.
    Failed { error: String },
    /// Another party took the job out of Running first.
    Lost,
    /// The outcome was not recorded before shutdown.
    Abandoned { error: String },
}

impl ExecutionResult {
    /// Check if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the job will run again.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Retrying { .. })
    }
}
