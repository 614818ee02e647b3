//! Task execution context.
//!
//! A [`TaskContext`] is handed to a function body when its task runs. It
//! exposes the resolved signature parameters by name and mediates every
//! read and write against the work directory, so bodies never touch paths
//! themselves.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde_yaml::Value;
use smol_str::SmolStr;

use crate::base::{Annotation, ExpandedItem, Result, Span, SparvError, expand_in_list};
use crate::config::ConfigTree;
use crate::project::{SourceFiles, SparvPaths};
use crate::storage::{Compression, WorkDir};

/// A signature parameter with classes, wildcards and config values
/// resolved to concrete values.
#[derive(Debug, Clone)]
pub enum ResolvedParam {
    Annotation(Annotation),
    AnnotationAllFiles(Annotation),
    Output {
        annotation: Annotation,
        allow_newlines: bool,
    },
    Data {
        name: SmolStr,
        corpus_level: bool,
        output: bool,
    },
    Marker {
        name: SmolStr,
        output: bool,
    },
    Model(PathBuf),
    ModelOutput(PathBuf),
    Binary(SmolStr),
    BinaryDir(SmolStr),
    Config(Value),
    Language(SmolStr),
    Corpus(SmolStr),
    SourceFilename,
    AllSourceFilenames(Vec<SmolStr>),
    Text,
    Source,
    ExportAnnotations(Vec<ExpandedItem>),
    SourceAnnotations(Vec<String>),
    HeaderAnnotations(Vec<String>),
    Wildcard {
        name: SmolStr,
        value: SmolStr,
    },
    Export(String),
    ExportInput(String),
}

/// Process-wide run state, built once during initialization and then
/// read-only.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub config: ConfigTree,
    pub paths: SparvPaths,
    pub compression: Compression,
    pub language: SmolStr,
    pub corpus_id: SmolStr,
    pub sources: SourceFiles,
    /// Files selected for this run (after `--file` filtering).
    pub files: Vec<SmolStr>,
}

impl ExecutionEnv {
    pub fn workdir_for(&self, file: &str) -> WorkDir {
        WorkDir::for_file(&self.paths.work_dir(), file, self.compression)
    }

    pub fn corpus_workdir(&self) -> WorkDir {
        WorkDir::for_corpus(&self.paths.work_dir(), self.compression)
    }
}

/// The execution context of one running task.
pub struct TaskContext<'a> {
    rule_id: &'a str,
    file: Option<&'a str>,
    params: &'a IndexMap<SmolStr, ResolvedParam>,
    env: &'a ExecutionEnv,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        rule_id: &'a str,
        file: Option<&'a str>,
        params: &'a IndexMap<SmolStr, ResolvedParam>,
        env: &'a ExecutionEnv,
    ) -> Self {
        Self {
            rule_id,
            file,
            params,
            env,
        }
    }

    pub fn rule_id(&self) -> &str {
        self.rule_id
    }

    /// The current source file name; errors for corpus-scoped tasks.
    pub fn file_name(&self) -> Result<&str> {
        self.file.ok_or_else(|| {
            SparvError::registry(format!(
                "'{}' is corpus-scoped but asked for a source file",
                self.rule_id
            ))
        })
    }

    pub fn language(&self) -> &str {
        &self.env.language
    }

    pub fn corpus_id(&self) -> &str {
        &self.env.corpus_id
    }

    pub fn all_files(&self) -> &[SmolStr] {
        &self.env.files
    }

    fn param(&self, name: &str) -> Result<&ResolvedParam> {
        self.params.get(name).ok_or_else(|| {
            SparvError::registry(format!(
                "'{}' has no parameter named '{name}'",
                self.rule_id
            ))
        })
    }

    fn workdir(&self) -> Result<WorkDir> {
        Ok(match self.file {
            Some(file) => self.env.workdir_for(file),
            None => self.env.corpus_workdir(),
        })
    }

    // ------------------------------------------------------------------
    // Annotation parameters
    // ------------------------------------------------------------------

    /// The concrete annotation behind an input or output parameter.
    pub fn annotation(&self, name: &str) -> Result<&Annotation> {
        match self.param(name)? {
            ResolvedParam::Annotation(a)
            | ResolvedParam::AnnotationAllFiles(a)
            | ResolvedParam::Output { annotation: a, .. } => Ok(a),
            _ => Err(self.wrong_kind(name, "an annotation")),
        }
    }

    pub fn read_spans(&self, name: &str) -> Result<Vec<Span>> {
        let annotation = self.annotation(name)?.clone();
        self.workdir()?.read_spans(&annotation)
    }

    pub fn read_attribute(&self, name: &str) -> Result<Vec<Option<String>>> {
        let annotation = self.annotation(name)?.clone();
        self.workdir()?.read_attribute(&annotation, false)
    }

    /// Read a span annotation of one specific file (all-files consumers).
    pub fn read_spans_of(&self, file: &str, annotation: &Annotation) -> Result<Vec<Span>> {
        self.env.workdir_for(file).read_spans(annotation)
    }

    pub fn read_attribute_of(
        &self,
        file: &str,
        annotation: &Annotation,
    ) -> Result<Vec<Option<String>>> {
        self.env.workdir_for(file).read_attribute(annotation, false)
    }

    /// Read an arbitrary annotation of the current file (exporters walking
    /// resolved annotation lists).
    pub fn read_annotation_spans(&self, annotation: &Annotation) -> Result<Vec<Span>> {
        self.workdir()?.read_spans(annotation)
    }

    pub fn read_annotation_attribute(
        &self,
        annotation: &Annotation,
    ) -> Result<Vec<Option<String>>> {
        self.workdir()?.read_attribute(annotation, false)
    }

    pub fn annotation_exists(&self, annotation: &Annotation) -> Result<bool> {
        Ok(self.workdir()?.annotation_exists(annotation))
    }

    /// Write a span annotation not declared as an output parameter.
    ///
    /// Importers create annotations driven by the source content; these
    /// must also be listed in the structure record.
    pub fn write_source_spans(&self, annotation: &Annotation, spans: &[Span]) -> Result<()> {
        self.workdir()?.write_spans(annotation, spans)
    }

    /// Write an attribute annotation not declared as an output parameter.
    pub fn write_source_attribute(
        &self,
        annotation: &Annotation,
        values: &[Option<String>],
    ) -> Result<()> {
        self.workdir()?.write_attribute(annotation, values, false)
    }

    pub fn write_spans(&self, name: &str, spans: &[Span]) -> Result<()> {
        match self.param(name)? {
            ResolvedParam::Output { annotation, .. } => {
                self.workdir()?.write_spans(annotation, spans)
            }
            _ => Err(self.wrong_kind(name, "an output annotation")),
        }
    }

    pub fn write_attribute(&self, name: &str, values: &[Option<String>]) -> Result<()> {
        match self.param(name)? {
            ResolvedParam::Output {
                annotation,
                allow_newlines,
            } => self
                .workdir()?
                .write_attribute(annotation, values, *allow_newlines),
            _ => Err(self.wrong_kind(name, "an output annotation")),
        }
    }

    // ------------------------------------------------------------------
    // Corpus text, source files, structure
    // ------------------------------------------------------------------

    pub fn text(&self) -> Result<String> {
        self.workdir()?.read_text()
    }

    /// Write the corpus text (importers only).
    pub fn write_text(&self, text: &str) -> Result<()> {
        self.workdir()?.write_text(text)
    }

    /// Record the annotations created from the source (importers only).
    pub fn write_structure(&self, annotations: &[Annotation]) -> Result<()> {
        self.workdir()?.write_structure(annotations)
    }

    pub fn read_structure(&self) -> Result<Vec<Annotation>> {
        self.workdir()?.read_structure()
    }

    /// Path of the raw source file for the current task.
    pub fn source_path(&self) -> Result<PathBuf> {
        Ok(self.env.sources.path_of(self.file_name()?))
    }

    // ------------------------------------------------------------------
    // Config, models, binaries
    // ------------------------------------------------------------------

    pub fn config_value(&self, name: &str) -> Result<&Value> {
        match self.param(name)? {
            ResolvedParam::Config(value) => Ok(value),
            _ => Err(self.wrong_kind(name, "a config value")),
        }
    }

    pub fn config_str(&self, name: &str) -> Result<Option<&str>> {
        Ok(self.config_value(name)?.as_str())
    }

    pub fn model_path(&self, name: &str) -> Result<&PathBuf> {
        match self.param(name)? {
            ResolvedParam::Model(path) | ResolvedParam::ModelOutput(path) => Ok(path),
            _ => Err(self.wrong_kind(name, "a model")),
        }
    }

    /// Locate a declared binary; missing executables are a prerequisite
    /// error.
    pub fn binary(&self, name: &str) -> Result<PathBuf> {
        match self.param(name)? {
            ResolvedParam::Binary(binary) => self.env.paths.find_binary(binary),
            _ => Err(self.wrong_kind(name, "a binary")),
        }
    }

    pub fn wildcard(&self, name: &str) -> Result<&str> {
        match self.param(name)? {
            ResolvedParam::Wildcard { value, .. } => Ok(value),
            _ => Err(self.wrong_kind(name, "a wildcard")),
        }
    }

    // ------------------------------------------------------------------
    // Export lists and paths
    // ------------------------------------------------------------------

    /// The resolved export annotation list.
    pub fn export_annotations(&self, name: &str) -> Result<&[ExpandedItem]> {
        match self.param(name)? {
            ResolvedParam::ExportAnnotations(items) => Ok(items),
            _ => Err(self.wrong_kind(name, "an export annotation list")),
        }
    }

    /// The source annotation list, expanded against the structure record
    /// of the current file. An absent config list keeps everything.
    pub fn source_annotations(&self, name: &str) -> Result<Vec<ExpandedItem>> {
        let entries = match self.param(name)? {
            ResolvedParam::SourceAnnotations(entries)
            | ResolvedParam::HeaderAnnotations(entries) => entries.clone(),
            _ => return Err(self.wrong_kind(name, "a source annotation list")),
        };
        let structure = self.read_structure()?;
        let entries = if entries.is_empty() {
            vec!["...".to_owned()]
        } else {
            entries
        };
        expand_in_list(&entries, &structure)
    }

    /// Resolve an export path template; `{file}` expands to the current
    /// source file name.
    pub fn export_path(&self, name: &str) -> Result<PathBuf> {
        match self.param(name)? {
            ResolvedParam::Export(template) | ResolvedParam::ExportInput(template) => {
                let rendered = match self.file {
                    Some(file) => template.replace("{file}", file),
                    None => template.clone(),
                };
                Ok(self.env.paths.export_dir().join(rendered))
            }
            _ => Err(self.wrong_kind(name, "an export path")),
        }
    }

    /// Publish a final export file atomically (uncompressed).
    pub fn write_export(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.export_path(name)?;
        crate::storage::write_export_file(&path, bytes)
    }

    // ------------------------------------------------------------------
    // Data and markers
    // ------------------------------------------------------------------

    pub fn read_data(&self, name: &str) -> Result<Vec<u8>> {
        match self.param(name)? {
            ResolvedParam::Data {
                name: data_name,
                corpus_level,
                ..
            } => {
                let workdir = if *corpus_level {
                    self.env.corpus_workdir()
                } else {
                    self.workdir()?
                };
                workdir.read_data(data_name)
            }
            _ => Err(self.wrong_kind(name, "a data annotation")),
        }
    }

    pub fn write_data(&self, name: &str, bytes: &[u8]) -> Result<()> {
        match self.param(name)? {
            ResolvedParam::Data {
                name: data_name,
                corpus_level,
                output: true,
            } => {
                let workdir = if *corpus_level {
                    self.env.corpus_workdir()
                } else {
                    self.workdir()?
                };
                workdir.write_data(data_name, bytes)
            }
            _ => Err(self.wrong_kind(name, "a data output")),
        }
    }

    /// Write an installer's own marker.
    pub fn write_marker(&self, name: &str) -> Result<()> {
        match self.param(name)? {
            ResolvedParam::Marker {
                name: marker,
                output: true,
            } => self
                .env
                .corpus_workdir()
                .write_data(marker, self.rule_id.as_bytes()),
            _ => Err(self.wrong_kind(name, "a marker output")),
        }
    }

    /// Remove the paired marker (installer removing its uninstaller's
    /// marker and vice versa).
    pub fn remove_marker(&self, name: &str) -> Result<()> {
        match self.param(name)? {
            ResolvedParam::Marker { name: marker, .. } => {
                self.env.corpus_workdir().remove_data(marker)
            }
            _ => Err(self.wrong_kind(name, "a marker")),
        }
    }

    pub fn marker_exists(&self, name: &str) -> Result<bool> {
        match self.param(name)? {
            ResolvedParam::Marker { name: marker, .. } => {
                Ok(self.env.corpus_workdir().data_exists(marker))
            }
            _ => Err(self.wrong_kind(name, "a marker")),
        }
    }

    fn wrong_kind(&self, name: &str, expected: &str) -> SparvError {
        SparvError::registry(format!(
            "parameter '{name}' of '{}' is not {expected}",
            self.rule_id
        ))
    }
}
