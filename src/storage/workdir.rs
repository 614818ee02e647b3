//! Per-file work directory layout.
//!
//! Each source file exclusively owns `sparv-workdir/<file>/`. Inside it,
//! every span annotation gets a directory holding the binary `span` file
//! and one file per attribute; data annotations live under `data/`,
//! completeness markers under `markers/`. The corpus text and the
//! source-structure record are written by the importer.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::base::{Annotation, Result, Span, SparvError};

use super::attr_file;
use super::compress::{self, Compression};
use super::span_file;

/// Pseudo-file name under which the corpus-scoped work area lives.
pub const CORPUS_DIR_NAME: &str = "_corpus";

const TEXT_FILE: &str = "@text";
const STRUCTURE_FILE: &str = "@structure";
const SPAN_FILE: &str = "span";

/// Contents of a completeness marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marker {
    /// Input-hash signature of the task that produced the outputs.
    pub signature: String,
}

/// Handle on the work directory of one source file (or of the corpus).
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
    compression: Compression,
}

impl WorkDir {
    /// The work directory of one source file.
    pub fn for_file(work_root: &Path, file: &str, compression: Compression) -> Self {
        Self {
            root: work_root.join(file),
            compression,
        }
    }

    /// The corpus-scoped work directory (exporter/installer artifacts).
    pub fn for_corpus(work_root: &Path, compression: Compression) -> Self {
        Self {
            root: work_root.join(CORPUS_DIR_NAME),
            compression,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ------------------------------------------------------------------
    // Corpus text and source structure
    // ------------------------------------------------------------------

    /// Write the corpus text (importer only).
    pub fn write_text(&self, text: &str) -> Result<()> {
        compress::write_atomic(&self.root.join(TEXT_FILE), text.as_bytes(), self.compression)
    }

    pub fn read_text(&self) -> Result<String> {
        let bytes = compress::read(&self.root.join(TEXT_FILE))?;
        String::from_utf8(bytes)
            .map_err(|_| SparvError::Corrupt("corpus text is not valid UTF-8".to_owned()))
    }

    pub fn has_text(&self) -> bool {
        self.root.join(TEXT_FILE).is_file()
    }

    /// Record the annotations the importer created from the source.
    pub fn write_structure(&self, annotations: &[Annotation]) -> Result<()> {
        let mut body = String::new();
        for ann in annotations {
            body.push_str(ann.as_str());
            body.push('\n');
        }
        compress::write_atomic(
            &self.root.join(STRUCTURE_FILE),
            body.as_bytes(),
            self.compression,
        )
    }

    pub fn has_structure(&self) -> bool {
        self.root.join(STRUCTURE_FILE).is_file()
    }

    /// The annotations listed in the source-structure record.
    pub fn read_structure(&self) -> Result<Vec<Annotation>> {
        let bytes = compress::read(&self.root.join(STRUCTURE_FILE))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| SparvError::Corrupt("structure record is not valid UTF-8".to_owned()))?;
        text.lines()
            .filter(|l| !l.is_empty())
            .map(Annotation::new)
            .collect()
    }

    // ------------------------------------------------------------------
    // Span and attribute annotations
    // ------------------------------------------------------------------

    /// Write a span annotation.
    pub fn write_spans(&self, annotation: &Annotation, spans: &[Span]) -> Result<()> {
        crate::base::check_monotone(spans)?;
        let path = self.span_path(annotation);
        compress::write_atomic(&path, &span_file::encode(spans), self.compression)
    }

    /// Read a span annotation, validating monotonicity.
    pub fn read_spans(&self, annotation: &Annotation) -> Result<Vec<Span>> {
        span_file::decode(&compress::read(&self.span_path(annotation))?)
    }

    /// Write an attribute annotation; the value count must match the span
    /// count of the base annotation.
    pub fn write_attribute(
        &self,
        annotation: &Annotation,
        values: &[Option<String>],
        allow_newlines: bool,
    ) -> Result<()> {
        let path = self.attribute_path(annotation)?;
        let spans = self.read_spans(&annotation.span())?;
        if spans.len() != values.len() {
            return Err(SparvError::Corrupt(format!(
                "attribute '{annotation}' has {} values for {} spans",
                values.len(),
                spans.len()
            )));
        }
        let body = attr_file::encode(values, allow_newlines)?;
        compress::write_atomic(&path, body.as_bytes(), self.compression)
    }

    pub fn read_attribute(
        &self,
        annotation: &Annotation,
        allow_newlines: bool,
    ) -> Result<Vec<Option<String>>> {
        let path = self.attribute_path(annotation)?;
        let bytes = compress::read(&path)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            SparvError::Corrupt(format!("attribute '{annotation}' is not valid UTF-8"))
        })?;
        Ok(attr_file::decode(&text, allow_newlines))
    }

    /// True when the artifact backing this annotation exists.
    pub fn annotation_exists(&self, annotation: &Annotation) -> bool {
        match self.artifact_path(annotation) {
            Ok(path) => path.is_file(),
            Err(_) => false,
        }
    }

    // ------------------------------------------------------------------
    // Data annotations
    // ------------------------------------------------------------------

    pub fn write_data(&self, name: &str, bytes: &[u8]) -> Result<()> {
        compress::write_atomic(&self.root.join("data").join(name), bytes, self.compression)
    }

    pub fn read_data(&self, name: &str) -> Result<Vec<u8>> {
        compress::read(&self.root.join("data").join(name))
    }

    pub fn data_exists(&self, name: &str) -> bool {
        self.root.join("data").join(name).is_file()
    }

    pub fn remove_data(&self, name: &str) -> Result<()> {
        let path = self.root.join("data").join(name);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Completeness markers
    // ------------------------------------------------------------------

    pub fn write_marker(&self, rule_id: &str, signature: &str) -> Result<()> {
        let marker = Marker {
            signature: signature.to_owned(),
        };
        let body = serde_json::to_vec(&marker)
            .map_err(|e| SparvError::Corrupt(format!("marker for '{rule_id}': {e}")))?;
        compress::write_atomic(&self.marker_path(rule_id), &body, Compression::None)
    }

    pub fn read_marker(&self, rule_id: &str) -> Result<Option<Marker>> {
        let path = self.marker_path(rule_id);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = compress::read(&path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SparvError::Corrupt(format!("marker for '{rule_id}': {e}")))
    }

    pub fn remove_marker(&self, rule_id: &str) -> Result<()> {
        let path = self.marker_path(rule_id);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hashing
    // ------------------------------------------------------------------

    /// Content hash of an annotation artifact (decompressed bytes, so the
    /// hash is stable across compression settings).
    pub fn artifact_hash(&self, annotation: &Annotation) -> Result<String> {
        let path = self.artifact_path(annotation)?;
        let bytes = compress::read(&path)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Content hash of the corpus text.
    pub fn text_hash(&self) -> Result<String> {
        let bytes = compress::read(&self.root.join(TEXT_FILE))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Content hash of the structure record.
    pub fn structure_hash(&self) -> Result<String> {
        let bytes = compress::read(&self.root.join(STRUCTURE_FILE))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Content hash of a data annotation.
    pub fn data_hash(&self, name: &str) -> Result<String> {
        let bytes = self.read_data(name)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    fn span_path(&self, annotation: &Annotation) -> PathBuf {
        self.root.join(annotation.span().as_str()).join(SPAN_FILE)
    }

    fn attribute_path(&self, annotation: &Annotation) -> Result<PathBuf> {
        let (base, attr) = annotation.split();
        let attr = attr.ok_or_else(|| {
            SparvError::Corrupt(format!("'{annotation}' is not an attribute annotation"))
        })?;
        Ok(self.root.join(base).join(attr))
    }

    /// Path of the artifact backing an annotation (span or attribute).
    pub fn artifact_path(&self, annotation: &Annotation) -> Result<PathBuf> {
        if annotation.has_attribute() {
            self.attribute_path(annotation)
        } else {
            Ok(self.span_path(annotation))
        }
    }

    fn marker_path(&self, rule_id: &str) -> PathBuf {
        self.root.join("markers").join(rule_id.replace(':', "."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workdir(tmp: &TempDir) -> WorkDir {
        WorkDir::for_file(tmp.path(), "doc1", Compression::Gzip)
    }

    fn ann(name: &str) -> Annotation {
        Annotation::new(name).unwrap()
    }

    #[test]
    fn test_text_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let wd = workdir(&tmp);
        wd.write_text("Ord, ord, ord.").unwrap();
        assert_eq!(wd.read_text().unwrap(), "Ord, ord, ord.");
        assert!(wd.has_text());
    }

    #[test]
    fn test_span_and_attribute_layout() {
        let tmp = TempDir::new().unwrap();
        let wd = workdir(&tmp);
        let token = ann("segment.token");
        let spans = vec![Span::new(0, 3).unwrap(), Span::new(4, 7).unwrap()];
        wd.write_spans(&token, &spans).unwrap();
        assert!(tmp.path().join("doc1/segment.token/span").is_file());

        let word = ann("segment.token:misc.word");
        wd.write_attribute(&word, &[Some("Ord".into()), Some("ord".into())], false)
            .unwrap();
        assert!(tmp.path().join("doc1/segment.token/misc.word").is_file());
        assert_eq!(
            wd.read_attribute(&word, false).unwrap(),
            vec![Some("Ord".to_owned()), Some("ord".to_owned())]
        );
        assert!(wd.annotation_exists(&word));
        assert!(wd.annotation_exists(&token));
    }

    #[test]
    fn test_attribute_length_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let wd = workdir(&tmp);
        let token = ann("segment.token");
        wd.write_spans(&token, &[Span::new(0, 3).unwrap()]).unwrap();
        let word = ann("segment.token:misc.word");
        let err = wd.write_attribute(&word, &[Some("a".into()), Some("b".into())], false);
        assert!(err.is_err());
    }

    #[test]
    fn test_marker_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let wd = workdir(&tmp);
        assert!(wd.read_marker("segment:tokenize").unwrap().is_none());
        wd.write_marker("segment:tokenize", "abc123").unwrap();
        let marker = wd.read_marker("segment:tokenize").unwrap().unwrap();
        assert_eq!(marker.signature, "abc123");
        wd.remove_marker("segment:tokenize").unwrap();
        assert!(wd.read_marker("segment:tokenize").unwrap().is_none());
    }

    #[test]
    fn test_artifact_hash_ignores_compression() {
        let tmp = TempDir::new().unwrap();
        let gz = WorkDir::for_file(tmp.path(), "a", Compression::Gzip);
        let plain = WorkDir::for_file(tmp.path(), "b", Compression::None);
        let token = ann("segment.token");
        let spans = vec![Span::new(0, 3).unwrap()];
        gz.write_spans(&token, &spans).unwrap();
        plain.write_spans(&token, &spans).unwrap();
        assert_eq!(
            gz.artifact_hash(&token).unwrap(),
            plain.artifact_hash(&token).unwrap()
        );
    }

    #[test]
    fn test_data_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let wd = workdir(&tmp);
        wd.write_data("misc.stats", b"{}").unwrap();
        assert!(wd.data_exists("misc.stats"));
        assert_eq!(wd.read_data("misc.stats").unwrap(), b"{}");
        wd.remove_data("misc.stats").unwrap();
        assert!(!wd.data_exists("misc.stats"));
    }
}
