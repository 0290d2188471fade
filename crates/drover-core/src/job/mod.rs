mod context;
mod log;
mod record;
mod traits;

pub use context::JobContext;
pub use log::{format_log_lines, JobLogRecorder, LOGGING_DISABLED};
pub use record::{Collection, Job, JobEntry, JobId, Lease, QueueStats};
pub use traits::{BackoffStrategy, DroverJob, HandlerFuture, JobHandler, RetryConfig};
