//! Source-file discovery.
//!
//! All source files of a corpus live under one directory, share a single
//! extension and are parsed by the one configured importer.

use std::fs;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;

use crate::base::{Result, SparvError};

/// The discovered source files of a corpus.
#[derive(Debug, Clone)]
pub struct SourceFiles {
    dir: PathBuf,
    extension: String,
    names: Vec<SmolStr>,
}

impl SourceFiles {
    /// Scan a source directory.
    ///
    /// Errors when the directory is missing, empty, or contains files with
    /// more than one extension.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(SparvError::missing(
                "source directory",
                dir.display().to_string(),
            ));
        }
        let mut extension: Option<String> = None;
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match &extension {
                None => extension = Some(ext.to_owned()),
                Some(seen) if seen != ext => {
                    return Err(SparvError::config(
                        "import",
                        format!(
                            "mixed source extensions '.{seen}' and '.{ext}' under {}",
                            dir.display()
                        ),
                    ));
                }
                Some(_) => {}
            }
            names.push(SmolStr::new(stem));
        }
        let Some(extension) = extension else {
            return Err(SparvError::missing(
                "source files",
                format!("no files under {}", dir.display()),
            ));
        };
        names.sort();
        Ok(Self {
            dir: dir.to_owned(),
            extension,
            names,
        })
    }

    /// The shared extension (without the leading dot).
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// File names (extension stripped), sorted.
    pub fn names(&self) -> &[SmolStr] {
        &self.names
    }

    /// Apply a `--file` restriction; unknown names are an error.
    pub fn filtered(&self, only: &[String]) -> Result<Vec<SmolStr>> {
        if only.is_empty() {
            return Ok(self.names.clone());
        }
        let mut out = Vec::new();
        for want in only {
            let want = want
                .strip_suffix(&format!(".{}", self.extension))
                .unwrap_or(want);
            match self.names.iter().find(|n| n.as_str() == want) {
                Some(name) => out.push(name.clone()),
                None => {
                    return Err(SparvError::missing(
                        "source file",
                        format!("'{want}' not found under {}", self.dir.display()),
                    ));
                }
            }
        }
        Ok(out)
    }

    /// Full path of one source file.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_discover_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.xml", "<text/>");
        touch(tmp.path(), "a.xml", "<text/>");
        let sources = SourceFiles::discover(tmp.path()).unwrap();
        assert_eq!(sources.extension(), "xml");
        let names: Vec<&str> = sources.names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(sources.path_of("a").ends_with("a.xml"));
    }

    #[test]
    fn test_mixed_extensions_error() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.xml", "<text/>");
        touch(tmp.path(), "b.txt", "text");
        assert!(SourceFiles::discover(tmp.path()).is_err());
    }

    #[test]
    fn test_filter_unknown_file_error() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.txt", "text");
        let sources = SourceFiles::discover(tmp.path()).unwrap();
        assert!(sources.filtered(&["a".into()]).is_ok());
        assert!(sources.filtered(&["a.txt".into()]).is_ok());
        assert!(sources.filtered(&["missing".into()]).is_err());
    }
}
