//! Dependency graph construction.
//!
//! Translates the materialized rule set plus a requested target set into a
//! DAG of file-level tasks: per-file tasks for file-scoped rules, one task
//! for corpus-scoped rules, with edges wherever an output of one task is
//! an input of another.

mod builder;
mod task;

pub use builder::{TaskGraph, build_graph};
pub use task::{Task, TaskId};
