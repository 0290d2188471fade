mod admin;
mod backoff;
mod dispatcher;
mod executor;
mod promoter;
mod registry;
mod worker;

pub use admin::{QueueAdmin, QueueSummary, PAGE_SIZE};
pub use backoff::PollBackoff;
pub use dispatcher::JobDispatcher;
pub use executor::{ExecutionResult, JobExecutor};
pub use promoter::DelayPromoter;
pub use registry::JobRegistry;
pub use worker::{QueueWorker, WorkerPool};
