//! Project management: data directory resolution, corpus layout and
//! source-file discovery.

mod paths;
mod source;

pub use paths::SparvPaths;
pub use source::SourceFiles;
