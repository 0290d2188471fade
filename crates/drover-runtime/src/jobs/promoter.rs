use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use drover_core::error::Result;
use drover_core::store::QueueStore;

/// Moves due delayed jobs into Pending.
///
/// Several promoters may run against the same store; `promote_due` is atomic,
/// so a job is promoted exactly once no matter how many sweep it.
pub struct DelayPromoter {
    store: Arc<dyn QueueStore>,
    queues: Vec<String>,
    interval: Duration,
}

impl DelayPromoter {
    pub fn new(store: Arc<dyn QueueStore>, queues: Vec<String>, interval: Duration) -> Self {
        Self {
            store,
            queues,
            interval,
        }
    }

    /// Promote every due job of every queue once. Returns the number moved.
    pub async fn promote_once(&self) -> Result<u64> {
        let now = self.store.now().await?;
        let mut total = 0;

        for queue in &self.queues {
            match self.store.promote_due(queue, now).await {
                Ok(0) => {}
                Ok(moved) => {
                    tracing::debug!(queue = %queue, moved, "Promoted delayed jobs");
                    total += moved;
                }
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "Failed to promote delayed jobs");
                }
            }
        }

        Ok(total)
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, queues = self.queues.len(), "Delay promoter started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.promote_once().await {
                        tracing::warn!(error = %e, "Delay promoter sweep failed");
                    }
                }
            }
        }

        tracing::info!("Delay promoter stopped");
    }
}
