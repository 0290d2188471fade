use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::{BackoffStrategy, RetryConfig};

/// Per-queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs of this queue running at once, cluster-wide.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Executions allowed before a job fails permanently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay strategy between retries.
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Backoff base delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Per-execution timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff: BackoffStrategy::default(),
            base_delay_ms: default_base_delay(),
            max_backoff_secs: default_max_backoff(),
            timeout_secs: None,
        }
    }
}

impl QueueConfig {
    /// Retry policy derived from this queue's settings.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_concurrency() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    300
}
