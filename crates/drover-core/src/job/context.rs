use crate::cluster::WorkerId;
use crate::error::Result;

use super::log::JobLogRecorder;
use super::record::{Job, JobId};

/// Context available to job handlers.
#[derive(Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,
    /// Queue the job was taken from.
    pub queue: String,
    /// Current attempt number (1-based).
    pub attempt: u32,
    /// Maximum attempts allowed.
    pub max_attempts: u32,
    /// Worker executing this attempt.
    pub worker_id: WorkerId,
    /// Key of the job's log.
    pub log_id: String,
    logger: JobLogRecorder,
}

impl JobContext {
    /// Create a context for executing `job`.
    pub fn new(job: &Job, max_attempts: u32, worker_id: WorkerId, logger: JobLogRecorder) -> Self {
        Self {
            job_id: job.id,
            queue: job.queue.clone(),
            attempt: job.attempts + 1,
            max_attempts,
            worker_id,
            log_id: job.log_id.clone(),
            logger,
        }
    }

    /// Append a line to the job's log.
    pub async fn log(&self, text: impl AsRef<str>) -> Result<()> {
        self.logger
            .append(&self.log_id, self.attempt, self.worker_id, text.as_ref())
            .await
    }

    /// Check if this is a retry attempt.
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    /// Check if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
