use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use drover_core::config::{DroverConfig, RetentionConfig};
use drover_core::error::Result;
use drover_core::job::{Collection, JobEntry, JobLogRecorder, Lease};
use drover_core::store::{QueueStore, RunningGuard};

const ORPHAN_ERROR: &str = "heartbeat timeout";

/// Outcome of one monitor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphans sent back to Pending.
    pub requeued: u64,
    /// Orphans that had used up their attempts.
    pub failed: u64,
    /// Worker registry entries removed.
    pub pruned_workers: u64,
    /// Done/Failed entries dropped by retention.
    pub trimmed: u64,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Recovers jobs whose worker stopped heartbeating and keeps the registry tidy.
///
/// Every cluster member runs one. Recovery uses a staleness guard, so an
/// entry whose owner refreshed its heartbeat between the read and the move
/// is left alone, and two monitors racing on the same orphan move it once.
pub struct HeartbeatMonitor {
    store: Arc<dyn QueueStore>,
    logger: JobLogRecorder,
    cluster: String,
    queues: Vec<(String, u32)>,
    orphan_timeout: Duration,
    worker_timeout: Duration,
    retention: RetentionConfig,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(store: Arc<dyn QueueStore>, logger: JobLogRecorder, config: &DroverConfig) -> Self {
        Self {
            store,
            logger,
            cluster: config.cluster.name.clone(),
            queues: config
                .queues
                .iter()
                .map(|(name, queue)| (name.clone(), queue.max_attempts))
                .collect(),
            orphan_timeout: config.worker.orphan_timeout(),
            worker_timeout: config.cluster.worker_timeout(),
            retention: config.retention.clone(),
            interval: config.monitor.sweep_interval(),
        }
    }

    /// Run one sweep over every configured queue.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.store.now().await?;
        let cutoff = before(now, self.orphan_timeout);
        let mut report = SweepReport::default();

        for (queue, max_attempts) in &self.queues {
            if let Err(e) = self.recover_orphans(queue, *max_attempts, cutoff, &mut report).await {
                tracing::warn!(queue = %queue, error = %e, "Orphan recovery failed");
            }
            if let Err(e) = self.apply_retention(queue, &mut report).await {
                tracing::warn!(queue = %queue, error = %e, "Retention trim failed");
            }
        }

        match self
            .store
            .prune_workers(&self.cluster, before(now, self.worker_timeout))
            .await
        {
            Ok(0) => {}
            Ok(pruned) => {
                tracing::info!(cluster = %self.cluster, pruned, "Pruned silent workers");
                report.pruned_workers = pruned;
            }
            Err(e) => tracing::warn!(cluster = %self.cluster, error = %e, "Worker pruning failed"),
        }

        Ok(report)
    }

    async fn recover_orphans(
        &self,
        queue: &str,
        max_attempts: u32,
        cutoff: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        for entry in self.store.running(queue).await? {
            let Some(lease) = entry.lease.filter(|l| l.is_stale(cutoff)) else {
                continue;
            };
            self.recover(queue, &entry, lease, max_attempts, cutoff, report)
                .await?;
        }
        Ok(())
    }

    async fn recover(
        &self,
        queue: &str,
        entry: &JobEntry,
        lease: Lease,
        max_attempts: u32,
        cutoff: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let job = &entry.job;
        let attempt = job.attempts + 1;
        let guard = RunningGuard::StaleBefore(cutoff);
        let retry = attempt < max_attempts;

        let moved = if retry {
            self.store
                .requeue_from_running(queue, job.id, Some(ORPHAN_ERROR.to_string()), None, guard)
                .await?
        } else {
            self.store
                .fail(queue, job.id, Some(ORPHAN_ERROR.to_string()), guard)
                .await?
        };

        // Refreshed or reclaimed since the read.
        if !moved {
            return Ok(());
        }

        if let Err(e) = self
            .logger
            .append(&job.log_id, attempt, lease.worker_id, "error: heartbeat timeout")
            .await
        {
            tracing::debug!(job_id = %job.id, error = %e, "Failed to write job log");
        }

        if retry {
            report.requeued += 1;
            tracing::info!(
                queue = %queue,
                job_id = %job.id,
                worker_id = %lease.worker_id,
                attempt,
                "Recovered orphaned job"
            );
        } else {
            report.failed += 1;
            tracing::error!(
                queue = %queue,
                job_id = %job.id,
                worker_id = %lease.worker_id,
                attempt,
                "Orphaned job exhausted its attempts"
            );
        }
        Ok(())
    }

    async fn apply_retention(&self, queue: &str, report: &mut SweepReport) -> Result<()> {
        for (collection, keep) in [
            (Collection::Done, self.retention.max_done),
            (Collection::Failed, self.retention.max_failed),
        ] {
            if keep == 0 {
                continue;
            }
            let trimmed = self.store.trim_history(queue, collection, keep).await?;
            if trimmed > 0 {
                tracing::debug!(queue = %queue, collection = %collection, trimmed, "Trimmed history");
                report.trimmed += trimmed;
            }
        }
        Ok(())
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            cluster = %self.cluster,
            interval = ?self.interval,
            orphan_timeout = ?self.orphan_timeout,
            "Heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    match self.sweep().await {
                        Ok(report) if !report.is_empty() => {
                            tracing::debug!(report = ?report, "Monitor sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Monitor sweep failed"),
                    }
                }
            }
        }

        tracing::info!("Heartbeat monitor stopped");
    }
}

fn before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
