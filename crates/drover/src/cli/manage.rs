use anyhow::Result;
use clap::Args;
use console::style;

use drover_core::config::DroverConfig;
use drover_core::job::{Collection, JobId};

/// Addresses one job entry.
#[derive(Args)]
pub struct JobRefArgs {
    /// Queue name.
    pub queue: String,

    /// Collection the job is expected in.
    pub collection: Collection,

    /// Job id.
    pub job_id: JobId,
}

pub async fn requeue(args: JobRefArgs, config: DroverConfig) -> Result<()> {
    let admin = super::connect(config).await?.admin();
    admin.requeue(&args.queue, args.collection, args.job_id).await?;
    println!("  {} Requeued {}", style("✓").green(), args.job_id);
    Ok(())
}

pub async fn delete(args: JobRefArgs, config: DroverConfig) -> Result<()> {
    let admin = super::connect(config).await?.admin();
    admin.delete(&args.queue, args.collection, args.job_id).await?;
    println!("  {} Deleted {}", style("✓").green(), args.job_id);
    Ok(())
}
