use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::cluster::WorkerId;
use crate::error::Result;
use crate::store::QueueStore;

/// Text returned for a missing log while job logging is turned off.
pub const LOGGING_DISABLED: &str = "job logging is disabled";

/// Append-only recorder for per-job execution logs.
///
/// Every line is tagged with the attempt and the worker that wrote it. An
/// orphaned executor that is still running may keep appending after the job
/// has been handed to another worker; both streams end up in the same log,
/// distinguishable by their tags, and neither overwrites the other.
#[derive(Clone)]
pub struct JobLogRecorder {
    store: Arc<dyn QueueStore>,
    enabled: bool,
}

impl JobLogRecorder {
    /// Create a new recorder.
    pub fn new(store: Arc<dyn QueueStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Whether lines are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one or more lines written during `attempt` by `worker`.
    ///
    /// Lines are stamped with the store clock, like every other job time.
    pub async fn append(
        &self,
        log_id: &str,
        attempt: u32,
        worker: WorkerId,
        text: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let at = self.store.now().await?;
        let formatted = format_log_lines(at, attempt, worker, text);
        self.store.append_log(log_id, &formatted).await
    }

    /// Read the accumulated log text.
    pub async fn read(&self, log_id: &str) -> Result<String> {
        match self.store.read_log(log_id).await? {
            Some(text) => Ok(text),
            None if !self.enabled => Ok(LOGGING_DISABLED.to_string()),
            None => Ok(String::new()),
        }
    }
}

/// Prefix every line of `text` with its timestamp, attempt and writer.
pub fn format_log_lines(at: DateTime<Utc>, attempt: u32, worker: WorkerId, text: &str) -> String {
    let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let worker = worker.short();
    let mut out = String::with_capacity(text.len() + 64);

    for line in text.lines() {
        out.push_str(&format!("[{} attempt={} worker={}] {}\n", stamp, attempt, worker, line));
    }
    if out.is_empty() {
        out.push_str(&format!("[{} attempt={} worker={}]\n", stamp, attempt, worker));
    }

    out
}
