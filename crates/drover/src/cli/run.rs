use anyhow::Result;
use clap::Parser;
use console::style;

use drover_core::config::DroverConfig;

use drover::Drover;

/// Run a cluster member.
///
/// The binary has no job handlers of its own, so queues are not served; it
/// runs the delay promoter, the heartbeat monitor and the registry heartbeat.
#[derive(Parser)]
pub struct RunCommand {
    /// Cluster name (overrides config).
    #[arg(long)]
    pub cluster: Option<String>,
}

impl RunCommand {
    /// Apply command-line overrides to the loaded configuration.
    fn apply(self, mut config: DroverConfig) -> DroverConfig {
        if let Some(cluster) = self.cluster {
            config.cluster.name = cluster;
        }
        config
    }

    pub async fn execute(self, config: DroverConfig) -> Result<()> {
        let config = self.apply(config);

        println!();
        println!(
            "  {} v{}",
            style("DROVER").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "  {} cluster {}, {} queue(s)",
            style("→").dim(),
            style(&config.cluster.name).cyan(),
            config.queues.len()
        );
        println!();

        let drover = Drover::builder().config(config).build()?;
        tracing::info!(worker_id = %drover.worker_id(), "Maintenance member starting");
        drover.run().await?;

        println!("\n  {} Stopped", style("✓").green());
        Ok(())
    }
}
