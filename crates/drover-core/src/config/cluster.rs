use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name; namespaces the worker registry.
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// How often a worker refreshes its registry entry, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Registry entries unseen for this long are pruned, in seconds.
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            worker_timeout_secs: default_worker_timeout(),
        }
    }
}

impl ClusterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_worker_timeout() -> u64 {
    30
}
