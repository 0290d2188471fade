mod heartbeat;
mod monitor;

pub use heartbeat::WorkerHeartbeat;
pub use monitor::{HeartbeatMonitor, SweepReport};
