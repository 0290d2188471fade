use anyhow::Result;
use clap::Parser;
use console::style;

use drover_core::config::DroverConfig;
use drover_runtime::db::Database;
use drover_runtime::migrations::MigrationRunner;

/// Apply the internal database schema.
#[derive(Parser)]
pub struct MigrateCommand {}

impl MigrateCommand {
    pub async fn execute(self, config: DroverConfig) -> Result<()> {
        let db = Database::from_config(&config.database).await?;
        let runner = MigrationRunner::new(db.pool().clone());

        println!("  {} Running pending migrations...", style("→").dim());
        let applied = runner.run().await?;
        db.close().await;

        if applied.is_empty() {
            println!("  {} Schema is up to date", style("ℹ").blue());
        } else {
            for name in &applied {
                println!("  {} Applied: {}", style("✓").green(), name);
            }
        }
        Ok(())
    }
}
