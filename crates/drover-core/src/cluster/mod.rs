mod worker;

pub use worker::{WorkerId, WorkerInfo, WorkerStatus};
