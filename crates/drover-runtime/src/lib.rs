pub mod cluster;
pub mod db;
pub mod jobs;
pub mod migrations;
pub mod store;

pub use cluster::{HeartbeatMonitor, SweepReport, WorkerHeartbeat};
pub use db::Database;
pub use jobs::{
    DelayPromoter, ExecutionResult, JobDispatcher, JobExecutor, JobRegistry, QueueAdmin,
    QueueSummary, QueueWorker, WorkerPool,
};
pub use migrations::{builtin_migrations, Migration, MigrationRunner};
pub use store::{MemoryStore, PgStore};
