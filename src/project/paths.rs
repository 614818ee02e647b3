//! Data-directory and corpus-directory layout.
//!
//! The data directory is shared across corpora and houses the default
//! configuration, presets, models and helper binaries. It resolves, in
//! order, from an explicit `--dir` flag, the `SPARV_DATADIR` environment
//! variable, and the path recorded by `sparv setup`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::base::{Result, SparvError};

/// Environment variable overriding the stored data-directory path.
pub const DATADIR_ENV: &str = "SPARV_DATADIR";

/// Subdirectory of the corpus holding intermediate per-file artifacts.
pub const WORK_DIR_NAME: &str = "sparv-workdir";

/// Resolved locations for one corpus plus the shared data directory.
#[derive(Debug, Clone)]
pub struct SparvPaths {
    corpus_dir: PathBuf,
    data_dir: PathBuf,
}

impl SparvPaths {
    /// Resolve paths for a corpus directory.
    ///
    /// `data_dir_override` comes from the `--dir` flag and wins over the
    /// environment and the stored setting.
    pub fn new(corpus_dir: impl Into<PathBuf>, data_dir_override: Option<PathBuf>) -> Result<Self> {
        let corpus_dir = corpus_dir.into();
        let data_dir = match data_dir_override {
            Some(dir) => dir,
            None => match env::var_os(DATADIR_ENV) {
                Some(dir) => PathBuf::from(dir),
                None => stored_data_dir()?.ok_or_else(|| {
                    SparvError::missing(
                        "data directory",
                        format!(
                            "run 'sparv setup --dir PATH' or set {DATADIR_ENV} to choose one"
                        ),
                    )
                })?,
            },
        };
        Ok(Self {
            corpus_dir,
            data_dir,
        })
    }

    /// Resolve paths when the data directory is known not to be needed.
    pub fn without_data_dir(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            data_dir: PathBuf::new(),
        }
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the source files (relative names resolve against
    /// the corpus directory).
    pub fn source_dir(&self, configured: &str) -> PathBuf {
        self.corpus_dir.join(configured)
    }

    /// Per-corpus work directory with one subdirectory per source file.
    pub fn work_dir(&self) -> PathBuf {
        self.corpus_dir.join(WORK_DIR_NAME)
    }

    /// Final outputs, one subdirectory per exporting module.
    pub fn export_dir(&self) -> PathBuf {
        self.corpus_dir.join("export")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.corpus_dir.join("logs")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.data_dir.join("bin")
    }

    pub fn config_default(&self) -> PathBuf {
        self.data_dir.join("config").join("config_default.yaml")
    }

    pub fn presets_dir(&self) -> PathBuf {
        self.data_dir.join("config").join("presets")
    }

    /// Locate an executable: first under the data directory's `bin/`,
    /// then on `PATH`.
    pub fn find_binary(&self, name: &str) -> Result<PathBuf> {
        let local = self.bin_dir().join(name);
        if local.is_file() {
            return Ok(local);
        }
        if let Some(path_var) = env::var_os("PATH") {
            for dir in env::split_paths(&path_var) {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(SparvError::missing(
            "executable",
            format!("'{name}' not found under {} or on PATH", self.bin_dir().display()),
        ))
    }

    /// Record the data directory for later runs (`sparv setup`).
    pub fn store_data_dir(dir: &Path) -> Result<()> {
        let setting = setting_file()?;
        if let Some(parent) = setting.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&setting, dir.to_string_lossy().as_bytes())?;
        Ok(())
    }
}

/// The data directory recorded by `sparv setup`, if any.
fn stored_data_dir() -> Result<Option<PathBuf>> {
    let setting = setting_file()?;
    if !setting.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&setting)?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(trimmed)))
    }
}

fn setting_file() -> Result<PathBuf> {
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| SparvError::missing("HOME", "cannot locate the sparv settings file"))?;
    Ok(home.join(".config").join("sparv").join("datadir"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let paths =
            SparvPaths::new("/tmp/corpus", Some(PathBuf::from("/tmp/data"))).unwrap();
        assert_eq!(paths.data_dir(), Path::new("/tmp/data"));
        assert_eq!(paths.work_dir(), Path::new("/tmp/corpus/sparv-workdir"));
        assert_eq!(paths.export_dir(), Path::new("/tmp/corpus/export"));
    }

    #[test]
    fn test_layout_under_data_dir() {
        let paths =
            SparvPaths::new("/tmp/corpus", Some(PathBuf::from("/tmp/data"))).unwrap();
        assert_eq!(
            paths.config_default(),
            Path::new("/tmp/data/config/config_default.yaml")
        );
        assert_eq!(paths.presets_dir(), Path::new("/tmp/data/config/presets"));
        assert_eq!(paths.models_dir(), Path::new("/tmp/data/models"));
    }
}
