pub mod clock;
pub mod cluster;
pub mod config;
pub mod error;
pub mod job;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{WorkerId, WorkerInfo, WorkerStatus};
pub use config::{DroverConfig, QueueConfig};
pub use error::{DroverError, Result};
pub use job::{
    BackoffStrategy, Collection, DroverJob, HandlerFuture, Job, JobContext, JobEntry, JobHandler,
    JobId, JobLogRecorder, Lease, QueueStats, RetryConfig,
};
pub use store::{QueueStore, RunningGuard, StoreFuture};
