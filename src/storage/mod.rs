//! Storage and codec layer.
//!
//! Reads and writes span and attribute files inside a per-file work
//! directory. Every write is atomic (temp file + rename), every file is
//! transparently compressed according to the configured algorithm, and
//! readers validate the invariants the rest of the engine relies on.

mod attr_file;
mod compress;
mod relations;
mod span_file;
mod workdir;

pub use attr_file::{SET_AFFIX, SET_DELIMITER, decode_set, encode_set};
pub use compress::Compression;
pub use relations::{ParentChildren, find_children};
pub use workdir::{CORPUS_DIR_NAME, Marker, WorkDir};

use std::path::Path;

use crate::base::Result;

/// Publish a final export file atomically, uncompressed.
pub fn write_export_file(path: &Path, bytes: &[u8]) -> Result<()> {
    compress::write_atomic(path, bytes, Compression::None)
}
