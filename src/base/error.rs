//! Error taxonomy for the pipeline engine.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SparvError>;

/// Errors surfaced by the pipeline engine.
///
/// Variants are grouped by kind rather than by origin: configuration and
/// registry errors are reported before any worker starts, task failures
/// during a run, and corrupt-artifact errors abort immediately.
#[derive(Debug, Error)]
pub enum SparvError {
    /// Unknown key, failed validation, bad value. Names the config path.
    #[error("configuration error at '{path}': {message}")]
    Config { path: String, message: String },

    /// Malformed annotation identifier.
    #[error("invalid annotation name '{name}': {message}")]
    Name { name: String, message: String },

    /// Conflicting or missing function declarations.
    #[error("registry error: {0}")]
    Registry(String),

    /// A `<class>` reference that no binding covers.
    #[error("unresolved class <{0}>")]
    UnresolvedClass(String),

    /// Two sources bind the same class to different annotations.
    #[error("conflicting bindings for class <{class}>: '{first}' vs '{second}'")]
    ClassConflict {
        class: String,
        first: String,
        second: String,
    },

    /// Requested target matches no exporter, rule or annotation.
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    /// Executable not on path, model missing, source file absent.
    #[error("missing {what}: {detail}")]
    MissingPrerequisite { what: String, detail: String },

    /// A task body returned an error or a child process failed.
    #[error("task '{rule}' failed: {message}")]
    Task {
        rule: String,
        file: Option<String>,
        message: String,
    },

    /// Cycle in the dependency graph, listing the identifiers involved.
    #[error("dependency cycle: {0}")]
    Cycle(String),

    /// Corrupted artifact or hash mismatch beyond repair. Fatal.
    #[error("corrupt artifact: {0}")]
    Corrupt(String),

    /// Preload socket protocol or connection error.
    #[error("preloader: {0}")]
    Preloader(String),

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Cancelled,

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// XML parsing or serialization error.
    #[error("XML error: {0}")]
    Xml(String),
}

impl SparvError {
    /// Create a configuration error naming the offending path.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a name parsing error.
    pub fn name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    /// Create a task failure error.
    pub fn task(
        rule: impl Into<String>,
        file: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::Task {
            rule: rule.into(),
            file: file.map(str::to_owned),
            message: message.into(),
        }
    }

    /// Create a missing-prerequisite error.
    pub fn missing(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Create an XML error.
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// True for errors caused by user input (config, targets, names).
    ///
    /// User errors are printed as a friendly message without a backtrace;
    /// everything else is treated as an unexpected crash.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Name { .. }
                | Self::Registry(_)
                | Self::UnresolvedClass(_)
                | Self::ClassConflict { .. }
                | Self::UnknownTarget(_)
                | Self::MissingPrerequisite { .. }
        )
    }

    /// True for internal invariant violations that abort the run immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}
