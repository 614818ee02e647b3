//! Tasks: rules scoped to source files.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::resolver::Rule;

/// Stable identity of a task: rule instance name plus optional file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub rule: SmolStr,
    pub file: Option<SmolStr>,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{} ({file})", self.rule),
            None => f.write_str(&self.rule),
        }
    }
}

/// One schedulable unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub rule: Arc<Rule>,
}

impl Task {
    pub fn new(rule: Arc<Rule>, file: Option<SmolStr>) -> Self {
        Self {
            id: TaskId {
                rule: rule.name.clone(),
                file,
            },
            rule,
        }
    }

    pub fn file(&self) -> Option<&str> {
        self.id.file.as_deref()
    }

    /// Scheduling priority (higher launches first among ready tasks).
    pub fn priority(&self) -> i16 {
        self.rule.function.priority
    }
}
