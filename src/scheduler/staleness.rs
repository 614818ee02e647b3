//! Staleness detection.
//!
//! Every task carries a signature: a content hash over the function id,
//! its parameter snapshot, the content hashes of its inputs, model file
//! fingerprints and binary version markers. After a task's outputs are
//! written, the signature is stored in a completeness marker; the next run
//! recomputes it and skips the task when nothing changed.

use std::fs;

use crate::base::Result;
use crate::graph::Task;
use crate::registry::{ExecutionEnv, FunctionKind, ResolvedParam};
use crate::resolver::{Artifact, RuleScope};
use crate::storage::WorkDir;

/// Compute a task's input-hash signature.
///
/// Requires the task's inputs to exist on disk (its dependencies must have
/// completed).
pub fn task_signature(task: &Task, env: &ExecutionEnv) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(task.rule.name.as_bytes());

    // Parameter snapshot: config values, wildcard bindings, output names.
    for (name, param) in &task.rule.params {
        hasher.update(name.as_bytes());
        hasher.update(render_param(param).as_bytes());
    }

    // Input artifact content hashes.
    for input in task.rule.inputs() {
        let files: Vec<&str> = if input.all_files {
            env.files.iter().map(|f| f.as_str()).collect()
        } else {
            match task.file() {
                Some(file) => vec![file],
                None => Vec::new(),
            }
        };
        match &input.artifact {
            Artifact::Annotation(annotation) => {
                for file in files {
                    hasher.update(env.workdir_for(file).artifact_hash(annotation)?.as_bytes());
                }
            }
            Artifact::Text => {
                for file in files {
                    hasher.update(env.workdir_for(file).text_hash()?.as_bytes());
                }
            }
            Artifact::Structure => {
                for file in files {
                    hasher.update(env.workdir_for(file).structure_hash()?.as_bytes());
                }
            }
            Artifact::Data { name, corpus_level } => {
                if *corpus_level {
                    hasher.update(env.corpus_workdir().data_hash(name)?.as_bytes());
                } else {
                    for file in files {
                        hasher.update(env.workdir_for(file).data_hash(name)?.as_bytes());
                    }
                }
            }
            Artifact::Marker(name) => {
                let exists = env.corpus_workdir().data_exists(name);
                hasher.update(if exists { b"1" } else { b"0" });
            }
            Artifact::Export(template) => {
                for file in files {
                    let rendered = template.replace("{file}", file);
                    let path = env.paths.export_dir().join(rendered);
                    hasher.update(&blake3::hash(&fs::read(path)?).as_bytes()[..]);
                }
            }
            Artifact::Model(path) => {
                if path.is_file() {
                    hasher.update(blake3::hash(&fs::read(path)?).as_bytes());
                } else {
                    hasher.update(b"absent");
                }
            }
        }
    }

    // Importers hash the raw source file, so a touched-but-unchanged
    // source re-executes nothing.
    if task.rule.function.kind == FunctionKind::Importer {
        if let Some(file) = task.file() {
            let bytes = fs::read(env.sources.path_of(file))?;
            hasher.update(blake3::hash(&bytes).as_bytes());
        }
    }

    // Model fingerprints.
    for param in task.rule.params.values() {
        if let ResolvedParam::Model(path) = param {
            if path.is_file() {
                hasher.update(blake3::hash(&fs::read(path)?).as_bytes());
            } else {
                hasher.update(b"absent");
            }
        }
    }

    // Binary version markers: path plus size and mtime.
    for param in task.rule.params.values() {
        if let ResolvedParam::Binary(name) = param {
            match env.paths.find_binary(name) {
                Ok(path) => {
                    hasher.update(path.to_string_lossy().as_bytes());
                    if let Ok(meta) = path.metadata() {
                        hasher.update(&meta.len().to_le_bytes());
                    }
                }
                Err(_) => {
                    hasher.update(b"missing");
                }
            }
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// True when every output artifact of the task exists on disk.
pub fn outputs_complete(task: &Task, env: &ExecutionEnv) -> bool {
    let workdir: WorkDir = match task.file() {
        Some(file) => env.workdir_for(file),
        None => env.corpus_workdir(),
    };
    task.rule.outputs().iter().all(|artifact| match artifact {
        Artifact::Annotation(annotation) => workdir.annotation_exists(annotation),
        Artifact::Text => workdir.has_text(),
        Artifact::Structure => workdir.has_structure(),
        Artifact::Data { name, corpus_level } => {
            if *corpus_level {
                env.corpus_workdir().data_exists(name)
            } else {
                workdir.data_exists(name)
            }
        }
        Artifact::Marker(name) => env.corpus_workdir().data_exists(name),
        Artifact::Model(path) => path.is_file(),
        Artifact::Export(template) => {
            let rendered = match task.file() {
                Some(file) => template.replace("{file}", file),
                None => template.clone(),
            };
            env.paths.export_dir().join(rendered).is_file()
        }
    })
}

/// The marker workdir of a task (file-scoped or corpus-scoped).
pub fn marker_workdir(task: &Task, env: &ExecutionEnv) -> WorkDir {
    match task.rule.scope {
        RuleScope::File => match task.file() {
            Some(file) => env.workdir_for(file),
            None => env.corpus_workdir(),
        },
        RuleScope::Corpus => env.corpus_workdir(),
    }
}

pub(crate) fn render_param(param: &ResolvedParam) -> String {
    match param {
        ResolvedParam::Annotation(a)
        | ResolvedParam::AnnotationAllFiles(a)
        | ResolvedParam::Output { annotation: a, .. } => a.as_str().to_owned(),
        ResolvedParam::Data { name, .. } | ResolvedParam::Marker { name, .. } => {
            name.to_string()
        }
        ResolvedParam::Model(path) | ResolvedParam::ModelOutput(path) => {
            path.to_string_lossy().into_owned()
        }
        ResolvedParam::Binary(name) | ResolvedParam::BinaryDir(name) => name.to_string(),
        ResolvedParam::Config(value) => serde_yaml::to_string(value).unwrap_or_default(),
        ResolvedParam::Language(v) | ResolvedParam::Corpus(v) => v.to_string(),
        ResolvedParam::SourceFilename => "@file".to_owned(),
        ResolvedParam::AllSourceFilenames(files) => files.join(","),
        ResolvedParam::Text => "@text".to_owned(),
        ResolvedParam::Source => "@source".to_owned(),
        ResolvedParam::ExportAnnotations(items) => items
            .iter()
            .map(|i| i.render())
            .collect::<Vec<_>>()
            .join(","),
        ResolvedParam::SourceAnnotations(entries)
        | ResolvedParam::HeaderAnnotations(entries) => entries.join(","),
        ResolvedParam::Wildcard { name, value } => format!("{name}={value}"),
        ResolvedParam::Export(template) | ResolvedParam::ExportInput(template) => {
            template.clone()
        }
    }
}
