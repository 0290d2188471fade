mod enqueue;
mod inspect;
mod manage;
mod migrate;
mod run;

pub use enqueue::EnqueueCommand;
pub use inspect::{ListCommand, LogsCommand};
pub use manage::JobRefArgs;
pub use migrate::MigrateCommand;
pub use run::RunCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use drover_core::config::{DroverConfig, StoreBackend};

use drover::{init_tracing, Drover};

/// Drover - distributed background-job queue
#[derive(Parser)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = "drover.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a cluster member without job handlers (promoter, monitor, registry).
    Run(RunCommand),

    /// Apply the internal database schema.
    Migrate(MigrateCommand),

    /// Enqueue a job.
    Enqueue(EnqueueCommand),

    /// Show collection sizes of every queue.
    Stats,

    /// List one page of a queue collection.
    List(ListCommand),

    /// Move a failed or done job back to pending.
    Requeue(JobRefArgs),

    /// Delete a job that is not running.
    Delete(JobRefArgs),

    /// Print a job log.
    Logs(LogsCommand),

    /// Show registered workers.
    Workers,
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        init_tracing(&config.logging);

        match self.command {
            Commands::Run(cmd) => cmd.execute(config).await,
            Commands::Migrate(cmd) => cmd.execute(config).await,
            Commands::Enqueue(cmd) => cmd.execute(config).await,
            Commands::Stats => inspect::stats(config).await,
            Commands::List(cmd) => cmd.execute(config).await,
            Commands::Requeue(args) => manage::requeue(args, config).await,
            Commands::Delete(args) => manage::delete(args, config).await,
            Commands::Logs(cmd) => cmd.execute(config).await,
            Commands::Workers => inspect::workers(config).await,
        }
    }
}

fn load_config(path: &str) -> Result<DroverConfig> {
    if !Path::new(path).exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nPass --config or create drover.toml.",
            path
        );
    }
    Ok(DroverConfig::from_file(path)?)
}

/// Open the shared store for a one-shot command.
///
/// The memory store lives inside a single process, so there is nothing for a
/// separate CLI invocation to inspect or change.
async fn connect(config: DroverConfig) -> Result<Drover> {
    if config.store.backend == StoreBackend::Memory {
        anyhow::bail!("The memory store is process-local; this command needs the postgres backend");
    }

    let drover = Drover::builder().config(config).build()?;
    drover.migrate().await?;
    Ok(drover)
}
