//! Drover - distributed background-job queue
//!
//! Worker processes share a store (PostgreSQL, or memory for a single
//! process) and coordinate only through its atomic operations.

mod runtime;

pub use drover_core;
pub use drover_runtime;

pub use runtime::prelude;
pub use runtime::{init_tracing, Drover, DroverBuilder};
