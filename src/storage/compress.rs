//! Transparent compression and atomic file publication.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;

use crate::base::{Result, SparvError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression applied to work-directory files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Gzip,
    None,
}

impl Compression {
    /// Parse the `sparv.compression` config value.
    pub fn from_config(value: &str) -> Result<Self> {
        match value {
            "gzip" => Ok(Self::Gzip),
            "none" => Ok(Self::None),
            other => Err(SparvError::config(
                "sparv.compression",
                format!("unknown algorithm '{other}' (expected 'gzip' or 'none')"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::None => "none",
        }
    }
}

/// Write `bytes` to `path` atomically, compressing as requested.
///
/// The temp file lives in the target directory so the final rename stays on
/// one filesystem; an interrupted write leaves no artifact behind.
pub fn write_atomic(path: &Path, bytes: &[u8], compression: Compression) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SparvError::Corrupt(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(tmp.as_file_mut(), GzLevel::default());
            encoder.write_all(bytes)?;
            encoder.finish()?;
        }
        Compression::None => tmp.write_all(bytes)?,
    }
    tmp.persist(path)
        .map_err(|e| SparvError::Io(e.error))?;
    Ok(())
}

/// Read a file, decompressing when the gzip magic is present.
///
/// Sniffing keeps mixed work directories readable after the configured
/// algorithm changes.
pub fn read(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path)?;
    if raw.len() >= 2 && raw[..2] == GZIP_MAGIC {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(raw)
    }
}
