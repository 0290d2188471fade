use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::WorkerId;
use crate::error::DroverError;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DroverError::InvalidArgument(format!("Invalid job id '{}': {}", s, e)))
    }
}

/// The per-queue collections a job can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Ready for dispatch.
    Pending,
    /// Owned by a worker.
    Running,
    /// Waiting for its due time.
    Delayed,
    /// Exhausted its attempts.
    Failed,
    /// Completed successfully.
    Done,
}

impl Collection {
    /// All collections in lifecycle order.
    pub const ALL: [Collection; 5] = [
        Self::Pending,
        Self::Running,
        Self::Delayed,
        Self::Failed,
        Self::Done,
    ];

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Delayed => "delayed",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }

    /// Whether the collection only holds finished jobs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "delayed" => Ok(Self::Delayed),
            "failed" => Ok(Self::Failed),
            "done" => Ok(Self::Done),
            other => Err(DroverError::InvalidArgument(format!(
                "Unknown collection '{}'",
                other
            ))),
        }
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Queue the job belongs to.
    pub queue: String,
    /// Opaque payload, handed to the handler unchanged.
    pub payload: Vec<u8>,
    /// Number of finished executions.
    pub attempts: u32,
    /// When the job was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job may run.
    pub due_at: Option<DateTime<Utc>>,
    /// Key of the job's execution log.
    pub log_id: String,
    /// Error from the most recent failed execution.
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new job ready for immediate dispatch.
    pub fn new(queue: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: JobId::new(),
            queue: queue.into(),
            payload: payload.into(),
            attempts: 0,
            enqueued_at: Utc::now(),
            due_at: None,
            log_id: Uuid::new_v4().simple().to_string(),
            last_error: None,
        }
    }

    /// Set the due time.
    pub fn with_due_at(mut self, at: DateTime<Utc>) -> Self {
        self.due_at = Some(at);
        self
    }

    /// Whether the job may be dispatched at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.map_or(true, |due| due <= now)
    }
}

/// Ownership of a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    /// Worker executing the job.
    pub worker_id: WorkerId,
    /// Last time the worker proved it is alive.
    pub heartbeat_at: DateTime<Utc>,
}

impl Lease {
    /// Whether the heartbeat is strictly older than `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.heartbeat_at < cutoff
    }
}

/// A job together with the collection it currently sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub collection: Collection,
    pub job: Job,
    /// Present only for running jobs.
    pub lease: Option<Lease>,
}

/// Sizes of a queue's collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub delayed: u64,
    pub failed: u64,
    pub done: u64,
}

impl QueueStats {
    /// Size of one collection.
    pub fn get(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Pending => self.pending,
            Collection::Running => self.running,
            Collection::Delayed => self.delayed,
            Collection::Failed => self.failed,
            Collection::Done => self.done,
        }
    }

    /// Mutable access to one collection's size.
    pub fn get_mut(&mut self, collection: Collection) -> &mut u64 {
        match collection {
            Collection::Pending => &mut self.pending,
            Collection::Running => &mut self.running,
            Collection::Delayed => &mut self.delayed,
            Collection::Failed => &mut self.failed,
            Collection::Done => &mut self.done,
        }
    }

    /// Total number of jobs in the queue.
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.delayed + self.failed + self.done
    }
}
