use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;

use drover_core::config::DroverConfig;

/// Enqueue a job.
#[derive(Parser)]
pub struct EnqueueCommand {
    /// Target queue.
    pub queue: String,

    /// Payload, passed to the handler as raw bytes.
    pub payload: String,

    /// Run after this many seconds instead of immediately.
    #[arg(long)]
    pub delay_secs: Option<u64>,
}

impl EnqueueCommand {
    pub async fn execute(self, config: DroverConfig) -> Result<()> {
        let drover = super::connect(config).await?;
        let dispatcher = drover.dispatcher();
        let payload = self.payload.into_bytes();

        let id = match self.delay_secs {
            Some(secs) if secs > 0 => {
                dispatcher
                    .dispatch_in(&self.queue, Duration::from_secs(secs), payload)
                    .await?
            }
            _ => dispatcher.dispatch(&self.queue, payload).await?,
        };

        println!("  {} Enqueued {} on {}", style("✓").green(), id, style(&self.queue).cyan());
        Ok(())
    }
}
