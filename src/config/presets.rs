//! Annotation presets.
//!
//! A preset file lives under `config/presets/` in the data directory; its
//! file stem is the preset namespace (uppercase snake case, e.g.
//! `SWE_DEFAULT`). The file maps preset names to lists of annotation
//! identifiers and may declare default class bindings. Referencing
//! `SWE_DEFAULT.saldo` in an annotations list splices in the expansion.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tracing::debug;

use crate::base::{ListItem, Result, SparvError};

#[derive(Debug, Deserialize)]
struct PresetFile {
    #[serde(default)]
    classes: IndexMap<String, String>,
    #[serde(default)]
    presets: IndexMap<String, Vec<String>>,
}

/// All presets loaded from the data directory.
#[derive(Debug, Default, Clone)]
pub struct PresetLibrary {
    /// `NAMESPACE.name` -> annotation list.
    presets: FxHashMap<String, Vec<String>>,
    /// Namespace -> default class bindings.
    classes: FxHashMap<String, IndexMap<String, String>>,
}

impl PresetLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `*.yaml` preset file under a directory.
    ///
    /// A missing directory yields an empty library: presets are optional.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut library = Self::default();
        if !dir.is_dir() {
            return Ok(library);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Some(namespace) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_preset_namespace(namespace) {
                return Err(SparvError::config(
                    path.display().to_string(),
                    "preset namespace must be uppercase snake case",
                ));
            }
            let text = fs::read_to_string(&path)?;
            let file: PresetFile = serde_yaml::from_str(&text)?;
            for (name, annotations) in file.presets {
                library
                    .presets
                    .insert(format!("{namespace}.{name}"), annotations);
            }
            if !file.classes.is_empty() {
                library.classes.insert(namespace.to_owned(), file.classes);
            }
            debug!(namespace, "loaded preset file");
        }
        Ok(library)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, reference: &str) -> Option<&[String]> {
        self.presets.get(reference).map(Vec::as_slice)
    }

    /// Expand preset references in an annotation list.
    ///
    /// Returns the expanded list plus the default class bindings of every
    /// referenced namespace. Conflicting class defaults across referenced
    /// namespaces are an error, as is a `...` inside a preset expansion.
    pub fn expand(
        &self,
        entries: &[String],
    ) -> Result<(Vec<String>, IndexMap<String, String>)> {
        let mut out = Vec::new();
        let mut class_defaults: IndexMap<String, String> = IndexMap::new();
        let mut used_namespaces: FxHashSet<String> = FxHashSet::default();

        for entry in entries {
            match ListItem::parse(entry) {
                ListItem::Include { name, rename: None } if is_preset_reference(&name) => {
                    let mut stack = vec![name.clone()];
                    self.splice(&name, &mut out, &mut stack)?;
                    if let Some((namespace, _)) = name.split_once('.') {
                        used_namespaces.insert(namespace.to_owned());
                    }
                }
                _ => out.push(entry.clone()),
            }
        }

        for namespace in &used_namespaces {
            if let Some(bindings) = self.classes.get(namespace) {
                for (class, value) in bindings {
                    match class_defaults.get(class) {
                        Some(existing) if existing != value => {
                            return Err(SparvError::ClassConflict {
                                class: class.clone(),
                                first: existing.clone(),
                                second: value.clone(),
                            });
                        }
                        _ => {
                            class_defaults.insert(class.clone(), value.clone());
                        }
                    }
                }
            }
        }

        Ok((out, class_defaults))
    }

    fn splice(&self, reference: &str, out: &mut Vec<String>, stack: &mut Vec<String>) -> Result<()> {
        let Some(annotations) = self.presets.get(reference) else {
            return Err(SparvError::config(
                "export.annotations",
                format!("unknown preset '{reference}'"),
            ));
        };
        let namespace = reference.split_once('.').map(|(ns, _)| ns).unwrap_or("");
        for entry in annotations {
            if entry == "..." {
                return Err(SparvError::config(
                    "export.annotations",
                    format!("preset '{reference}' contains '...', which presets may not use"),
                ));
            }
            // A bare lowercase name that is itself a preset of the same
            // namespace nests; anything else is an annotation identifier.
            let nested_full = format!("{namespace}.{entry}");
            let nested = if is_preset_reference(entry) {
                Some(entry.clone())
            } else if self.presets.contains_key(&nested_full) {
                Some(nested_full)
            } else {
                None
            };
            match nested {
                Some(nested_ref) => {
                    if stack.iter().any(|s| s == &nested_ref) {
                        return Err(SparvError::config(
                            "export.annotations",
                            format!("preset reference cycle through '{nested_ref}'"),
                        ));
                    }
                    stack.push(nested_ref.clone());
                    self.splice(&nested_ref, out, stack)?;
                    stack.pop();
                }
                None => out.push(entry.clone()),
            }
        }
        Ok(())
    }
}

/// `SWE_DEFAULT` style namespace: uppercase snake case.
fn is_preset_namespace(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// `SWE_DEFAULT.saldo` style reference.
pub fn is_preset_reference(s: &str) -> bool {
    match s.split_once('.') {
        Some((namespace, rest)) => is_preset_namespace(namespace) && !rest.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> PresetLibrary {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("SWE_DEFAULT.yaml"),
            "classes:\n  token: segment.token\npresets:\n  saldo:\n    - <token>:saldo.baseform\n    - <token>:saldo.compwf\n  all:\n    - saldo\n    - <token>:misc.word\n",
        )
        .unwrap();
        PresetLibrary::load(tmp.path()).unwrap()
    }

    #[test]
    fn test_reference_detection() {
        assert!(is_preset_reference("SWE_DEFAULT.saldo"));
        assert!(!is_preset_reference("segment.token"));
        assert!(!is_preset_reference("<token>"));
    }

    #[test]
    fn test_expansion() {
        let lib = library();
        let (expanded, classes) = lib
            .expand(&["SWE_DEFAULT.saldo".to_owned(), "<sentence>".to_owned()])
            .unwrap();
        assert_eq!(
            expanded,
            vec![
                "<token>:saldo.baseform".to_owned(),
                "<token>:saldo.compwf".to_owned(),
                "<sentence>".to_owned(),
            ]
        );
        assert_eq!(classes.get("token"), Some(&"segment.token".to_owned()));
    }

    #[test]
    fn test_nested_preset() {
        let lib = library();
        let (expanded, _) = lib.expand(&["SWE_DEFAULT.all".to_owned()]).unwrap();
        assert_eq!(
            expanded,
            vec![
                "<token>:saldo.baseform".to_owned(),
                "<token>:saldo.compwf".to_owned(),
                "<token>:misc.word".to_owned(),
            ]
        );
    }

    #[test]
    fn test_unknown_preset_error() {
        let lib = library();
        assert!(lib.expand(&["SWE_DEFAULT.missing".to_owned()]).is_err());
    }

    #[test]
    fn test_rest_inside_preset_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("BAD.yaml"),
            "presets:\n  everything:\n    - '...'\n",
        )
        .unwrap();
        let lib = PresetLibrary::load(tmp.path()).unwrap();
        assert!(lib.expand(&["BAD.everything".to_owned()]).is_err());
    }

    #[test]
    fn test_conflicting_class_defaults_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("A_ONE.yaml"),
            "classes:\n  token: segment.token\npresets:\n  x:\n    - <token>:misc.word\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("B_TWO.yaml"),
            "classes:\n  token: other.token\npresets:\n  y:\n    - <token>:misc.word\n",
        )
        .unwrap();
        let lib = PresetLibrary::load(tmp.path()).unwrap();
        let err = lib.expand(&["A_ONE.x".to_owned(), "B_TWO.y".to_owned()]);
        assert!(err.is_err());
    }
}
