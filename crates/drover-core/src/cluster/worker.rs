use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DroverError;

/// Unique worker process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Generate a new random worker ID.
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

    /// First eight hex digits, for log prefixes.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker status in the cluster registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Dequeuing and executing jobs.
    Active,
    /// Shutting down, no longer dequeuing.
    Draining,
}

impl WorkerStatus {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draining => "draining",
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "draining" => Ok(Self::Draining),
            other => Err(DroverError::InvalidArgument(format!(
                "Unknown worker status '{}'",
                other
            ))),
        }
    }
}

/// Registry entry describing a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Unique worker ID.
    pub id: WorkerId,
    /// Hostname of the machine running the worker.
    pub hostname: String,
    /// OS process ID.
    pub pid: u32,
    /// Queues this worker serves.
    pub queues: Vec<String>,
    /// Current status.
    pub status: WorkerStatus,
    /// When the worker started.
    pub started_at: DateTime<Utc>,
    /// Last registry refresh.
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerInfo {
    /// Create the registry entry for the local process.
    pub fn new_local(hostname: impl Into<String>, queues: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkerId::new(),
            hostname: hostname.into(),
            pid: std::process::id(),
            queues,
            status: WorkerStatus::Active,
            started_at: now,
            last_heartbeat: now,
        }
    }

    /// Whether this worker serves `queue`.
    pub fn serves(&self, queue: &str) -> bool {
        self.queues.iter().any(|q| q == queue)
    }
}
