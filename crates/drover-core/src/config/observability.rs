use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,

    /// Whether handler output is recorded in job logs.
    #[serde(default = "default_true")]
    pub job_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            job_logs: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Bounds on finished-job history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Done entries kept per queue; 0 keeps everything.
    #[serde(default = "default_max_history")]
    pub max_done: u64,

    /// Failed entries kept per queue; 0 keeps everything.
    #[serde(default = "default_max_history")]
    pub max_failed: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_done: default_max_history(),
            max_failed: default_max_history(),
        }
    }
}

fn default_max_history() -> u64 {
    10_000
}
