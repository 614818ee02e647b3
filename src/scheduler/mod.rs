//! Scheduler and executor.
//!
//! Walks the task DAG with a bounded worker pool: respects completeness
//! markers, per-rule concurrency caps and the preload socket, and handles
//! dry-run, forced rerun, keep-going and progress statistics.

mod executor;
mod staleness;

pub use executor::{RunOptions, RunSummary, TaskOutcome, execute};
pub use staleness::{outputs_complete, task_signature};

pub(crate) use staleness::render_param as staleness_render;
