//! Corpus configuration loading.
//!
//! Loads the corpus YAML, applies the parent chain, merges the built-in
//! defaults file, expands preset references in the annotation lists, and
//! applies importer/exporter namespace inheritance.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_yaml::Value;
use tracing::debug;

use crate::base::{Result, SparvError};
use crate::project::SparvPaths;

use super::presets::PresetLibrary;
use super::tree::ConfigTree;

/// Default corpus config file name.
pub const CONFIG_FILE: &str = "config.yaml";

/// A fully merged corpus configuration.
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    tree: ConfigTree,
    /// Class defaults declared by referenced presets (overridden by
    /// `classes.*` in the config itself).
    preset_classes: IndexMap<String, String>,
}

impl CorpusConfig {
    /// Load and merge the corpus configuration.
    pub fn load(paths: &SparvPaths, presets: &PresetLibrary) -> Result<Self> {
        let config_path = paths.corpus_dir().join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(SparvError::missing(
                "corpus config",
                config_path.display().to_string(),
            ));
        }
        let mut tree = load_with_parents(&config_path, &mut FxHashSet::default())?;

        let defaults_path = paths.config_default();
        if defaults_path.is_file() {
            debug!(path = %defaults_path.display(), "merging built-in defaults");
            tree.merge_defaults(&ConfigTree::from_file(&defaults_path)?);
        }

        Self::from_tree(tree, presets)
    }

    /// Build from an already merged tree (used by tests and `run-rule`).
    pub fn from_tree(mut tree: ConfigTree, presets: &PresetLibrary) -> Result<Self> {
        for key in ["metadata.language", "import.importer"] {
            if !tree.contains(key) {
                return Err(SparvError::config(key, "required key is missing"));
            }
        }

        let mut preset_classes: IndexMap<String, String> = IndexMap::new();
        for list_key in ["export.annotations", "export.source_annotations"] {
            if let Some(entries) = tree.get_string_list(list_key) {
                let (expanded, classes) = presets.expand(&entries)?;
                for (class, value) in classes {
                    match preset_classes.get(&class) {
                        Some(existing) if existing != &value => {
                            return Err(SparvError::ClassConflict {
                                class,
                                first: existing.clone(),
                                second: value,
                            });
                        }
                        _ => {
                            preset_classes.insert(class, value);
                        }
                    }
                }
                tree.set(
                    list_key,
                    Value::Sequence(expanded.into_iter().map(Value::String).collect()),
                );
            }
        }

        Ok(Self {
            tree,
            preset_classes,
        })
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ConfigTree {
        &mut self.tree
    }

    /// ISO 639-3 language code of the corpus.
    pub fn language(&self) -> &str {
        self.tree.get_str("metadata.language").unwrap_or("")
    }

    /// Corpus identifier (defaults to `untitled`).
    pub fn corpus_id(&self) -> &str {
        self.tree.get_str("metadata.id").unwrap_or("untitled")
    }

    /// The configured importer as a `module:function` id.
    pub fn importer(&self) -> &str {
        self.tree.get_str("import.importer").unwrap_or("")
    }

    pub fn source_dir_name(&self) -> &str {
        self.tree.get_str("import.source_dir").unwrap_or("source")
    }

    /// User class bindings (`classes.*`), preset defaults filled in.
    pub fn class_bindings(&self) -> IndexMap<String, String> {
        let mut bindings = IndexMap::new();
        for class in self.tree.keys("classes") {
            if let Some(value) = self.tree.get_str(&format!("classes.{class}")) {
                bindings.insert(class, value.to_owned());
            }
        }
        for (class, value) in &self.preset_classes {
            bindings
                .entry(class.clone())
                .or_insert_with(|| value.clone());
        }
        bindings
    }

    /// Copy unset importer/exporter options from the `import`/`export`
    /// sections.
    ///
    /// For a declared option `xml_export.annotations`, the fallback is
    /// `export.annotations` with the same leaf key; importers inherit from
    /// `import` likewise.
    pub fn apply_inheritance(&mut self, option_keys: &[(String, bool)]) {
        for (key, is_importer) in option_keys {
            if self.tree.contains(key) {
                continue;
            }
            let Some((_, leaf)) = key.split_once('.') else {
                continue;
            };
            let section = if *is_importer { "import" } else { "export" };
            let fallback = format!("{section}.{leaf}");
            if let Some(value) = self.tree.get(&fallback).cloned() {
                debug!(from = %fallback, to = %key, "inherited option");
                self.tree.set(key, value);
            }
        }
    }
}

/// Load a config file and merge its parent chain.
///
/// Parents resolve relative to the config that names them; among parents,
/// later entries override earlier ones, and the child overrides them all.
fn load_with_parents(path: &Path, seen: &mut FxHashSet<PathBuf>) -> Result<ConfigTree> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_owned());
    if !seen.insert(canonical) {
        return Err(SparvError::config(
            path.display().to_string(),
            "parent config cycle",
        ));
    }
    let mut tree = ConfigTree::from_file(path)?;
    let parents = tree.get_string_list("parent").unwrap_or_default();
    let base_dir = path.parent().unwrap_or(Path::new("."));
    // Later parents take priority, so fold from the last backwards.
    for parent in parents.iter().rev() {
        let parent_path = base_dir.join(parent);
        if !parent_path.is_file() {
            return Err(SparvError::missing(
                "parent config",
                parent_path.display().to_string(),
            ));
        }
        let parent_tree = load_with_parents(&parent_path, seen)?;
        tree.merge_defaults(&parent_tree);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parent_chain_priority() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "base.yaml",
            "metadata:\n  language: swe\n  name: base\nimport:\n  importer: text_import:parse\n",
        );
        write(
            tmp.path(),
            "team.yaml",
            "metadata:\n  name: team\n  id: team-corpus\n",
        );
        let child = write(
            tmp.path(),
            "config.yaml",
            "parent: [base.yaml, team.yaml]\nmetadata:\n  id: mine\n",
        );
        let tree = load_with_parents(&child, &mut FxHashSet::default()).unwrap();
        // Child wins over all parents; later parent wins over earlier.
        assert_eq!(tree.get_str("metadata.id"), Some("mine"));
        assert_eq!(tree.get_str("metadata.name"), Some("team"));
        assert_eq!(tree.get_str("metadata.language"), Some("swe"));
    }

    #[test]
    fn test_parent_cycle_detected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.yaml", "parent: b.yaml\n");
        let b = write(tmp.path(), "b.yaml", "parent: a.yaml\n");
        assert!(load_with_parents(&b, &mut FxHashSet::default()).is_err());
    }

    #[test]
    fn test_required_keys() {
        let tree = ConfigTree::from_str("metadata:\n  language: swe\n").unwrap();
        assert!(CorpusConfig::from_tree(tree, &PresetLibrary::empty()).is_err());
    }

    #[test]
    fn test_class_bindings_user_over_preset() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "SWE_DEFAULT.yaml",
            "classes:\n  token: segment.token\n  sentence: segment.sentence\npresets:\n  basic:\n    - <token>:misc.word\n",
        );
        let presets = PresetLibrary::load(tmp.path()).unwrap();
        let tree = ConfigTree::from_str(
            "metadata:\n  language: swe\nimport:\n  importer: text_import:parse\nexport:\n  annotations: [SWE_DEFAULT.basic]\nclasses:\n  token: other.token\n",
        )
        .unwrap();
        let config = CorpusConfig::from_tree(tree, &presets).unwrap();
        let bindings = config.class_bindings();
        assert_eq!(bindings.get("token"), Some(&"other.token".to_owned()));
        assert_eq!(
            bindings.get("sentence"),
            Some(&"segment.sentence".to_owned())
        );
        assert_eq!(
            config.tree().get_string_list("export.annotations"),
            Some(vec!["<token>:misc.word".to_owned()])
        );
    }

    #[test]
    fn test_inheritance_from_export_section() {
        let tree = ConfigTree::from_str(
            "metadata:\n  language: swe\nimport:\n  importer: text_import:parse\nexport:\n  annotations: [\"<token>\"]\n",
        )
        .unwrap();
        let mut config = CorpusConfig::from_tree(tree, &PresetLibrary::empty()).unwrap();
        config.apply_inheritance(&[("xml_export.annotations".to_owned(), false)]);
        assert_eq!(
            config.tree().get_string_list("xml_export.annotations"),
            Some(vec!["<token>".to_owned()])
        );
    }
}
