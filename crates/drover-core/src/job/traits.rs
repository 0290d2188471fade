use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::Result;

use super::context::JobContext;

/// Boxed future returned by job handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Executes the raw payload of jobs from one queue.
pub trait JobHandler: Send + Sync + 'static {
    /// Run the job. An `Err` counts as a failed attempt.
    fn handle<'a>(&'a self, ctx: &'a JobContext, payload: &'a [u8]) -> HandlerFuture<'a>;
}

/// Typed job whose payload is JSON-encoded `Args`.
pub trait DroverJob: Send + Sync + 'static {
    /// Input arguments type.
    type Args: DeserializeOwned + Serialize + Send + Sync + 'static;

    /// Queue the job runs on.
    fn queue() -> &'static str;

    /// Execute the job.
    fn execute(ctx: &JobContext, args: Self::Args) -> HandlerFuture<'_>;
}

/// Retry configuration for a queue.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of executions before the job fails permanently.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Delay unit the strategy scales.
    pub base_delay: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl RetryConfig {
    /// Whether a job that has now finished `attempts` executions may run again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next execution after `attempt` failed executions.
    ///
    /// `None` means the job goes straight back to Pending.
    pub fn calculate_backoff(&self, attempt: u32) -> Option<Duration> {
        let base = self.base_delay;
        let backoff = match self.backoff {
            BackoffStrategy::None => return None,
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        };
        Some(backoff.min(self.max_backoff))
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Retry immediately through Pending.
    None,
    /// Same delay each time.
    Fixed,
    /// Delay increases linearly.
    Linear,
    /// Delay doubles each time.
    #[default]
    Exponential,
}
