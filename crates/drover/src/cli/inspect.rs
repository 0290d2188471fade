use anyhow::Result;
use clap::Parser;
use console::style;

use drover_core::config::DroverConfig;
use drover_core::job::{Collection, JobEntry};

/// List one page of a queue collection.
#[derive(Parser)]
pub struct ListCommand {
    /// Queue name.
    pub queue: String,

    /// pending, running, delayed, failed or done.
    pub collection: Collection,

    /// Offset of the first entry.
    #[arg(long, default_value = "0")]
    pub start: u64,
}

impl ListCommand {
    pub async fn execute(self, config: DroverConfig) -> Result<()> {
        let admin = super::connect(config).await?.admin();
        let entries = admin.list(&self.queue, self.collection, self.start).await?;

        if entries.is_empty() {
            println!("  {} No {} jobs", style("ℹ").blue(), self.collection);
            return Ok(());
        }
        for entry in &entries {
            println!("  {}", describe(entry));
        }
        Ok(())
    }
}

/// Print a job log.
#[derive(Parser)]
pub struct LogsCommand {
    /// Log id, as shown by `drover list`.
    pub log_id: String,
}

impl LogsCommand {
    pub async fn execute(self, config: DroverConfig) -> Result<()> {
        let admin = super::connect(config).await?.admin();
        print!("{}", admin.job_log(&self.log_id).await?);
        Ok(())
    }
}

pub async fn stats(config: DroverConfig) -> Result<()> {
    let admin = super::connect(config).await?.admin();

    println!(
        "  {:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "QUEUE",
        "CONC",
        "PENDING",
        "RUNNING",
        "DELAYED",
        "FAILED",
        "DONE"
    );
    for summary in admin.all_stats().await? {
        let s = summary.stats;
        println!(
            "  {:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8}",
            summary.queue, summary.concurrency, s.pending, s.running, s.delayed, s.failed, s.done
        );
    }
    println!();
    println!("  {} {} worker(s)", style("ℹ").blue(), admin.worker_count().await?);
    Ok(())
}

pub async fn workers(config: DroverConfig) -> Result<()> {
    let admin = super::connect(config).await?.admin();
    let workers = admin.workers().await?;

    if workers.is_empty() {
        println!("  {} No registered workers", style("ℹ").blue());
        return Ok(());
    }
    for w in &workers {
        println!(
            "  {} {} host={} pid={} queues=[{}] started={} seen={}",
            style(w.id.short()).cyan(),
            w.status.as_str(),
            w.hostname,
            w.pid,
            w.queues.join(","),
            w.started_at.format("%Y-%m-%d %H:%M:%S"),
            w.last_heartbeat.format("%H:%M:%S")
        );
    }
    Ok(())
}

fn describe(entry: &JobEntry) -> String {
    let job = &entry.job;
    let mut line = format!(
        "{} attempts={} log={} bytes={}",
        job.id,
        job.attempts,
        job.log_id,
        job.payload.len()
    );
    if let Some(due) = job.due_at {
        line.push_str(&format!(" due={}", due.to_rfc3339()));
    }
    if let Some(lease) = &entry.lease {
        line.push_str(&format!(
            " worker={} heartbeat={}",
            lease.worker_id.short(),
            lease.heartbeat_at.to_rfc3339()
        ));
    }
    if let Some(error) = &job.last_error {
        line.push_str(&format!(" error={:?}", error));
    }
    line
}
