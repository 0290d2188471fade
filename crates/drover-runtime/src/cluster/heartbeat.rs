use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use drover_core::cluster::{WorkerId, WorkerInfo, WorkerStatus};
use drover_core::error::Result;
use drover_core::store::QueueStore;

/// Keeps this process's entry in the cluster worker registry fresh.
pub struct WorkerHeartbeat {
    store: Arc<dyn QueueStore>,
    cluster: String,
    info: WorkerInfo,
    interval: Duration,
}

impl WorkerHeartbeat {
    pub fn new(
        store: Arc<dyn QueueStore>,
        cluster: impl Into<String>,
        info: WorkerInfo,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            cluster: cluster.into(),
            info,
            interval,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.info.id
    }

    /// Upsert the registry entry once.
    pub async fn beat(&self) -> Result<()> {
        self.store.register_worker(&self.cluster, &self.info).await
    }

    /// Refresh every `interval` until `shutdown` fires, then mark the entry draining.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            cluster = %self.cluster,
            worker_id = %self.info.id,
            hostname = %self.info.hostname,
            "Worker registered"
        );

        loop {
            if let Err(e) = self.beat().await {
                tracing::warn!(worker_id = %self.info.id, error = %e, "Failed to send worker heartbeat");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        let mut draining = self.info.clone();
        draining.status = WorkerStatus::Draining;
        if let Err(e) = self.store.register_worker(&self.cluster, &draining).await {
            tracing::warn!(worker_id = %self.info.id, error = %e, "Failed to mark worker draining");
        }
    }

    /// Remove the registry entry. Called once in-flight jobs have drained.
    pub async fn deregister(&self) {
        match self.store.deregister_worker(&self.cluster, self.info.id).await {
            Ok(()) => tracing::info!(worker_id = %self.info.id, "Worker deregistered"),
            Err(e) => {
                tracing::warn!(worker_id = %self.info.id, error = %e, "Failed to deregister worker")
            }
        }
    }
}
