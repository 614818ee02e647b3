//! Function registry.
//!
//! Every pipeline unit (importer, annotator, exporter, installer,
//! uninstaller, model builder) is a value registered at program startup: a
//! declaration carrying a signature of typed input/output descriptors, a
//! language whitelist, an ordering priority, declared config options, and
//! the executable body.

mod context;
mod descriptor;
mod function;
#[allow(clippy::module_inception)]
mod registry;

pub use context::{ExecutionEnv, ResolvedParam, TaskContext};
pub use descriptor::{Descriptor, Param};
pub use function::{FunctionDecl, FunctionKind, PreloadSpec, RuleBody};
pub use registry::Registry;
