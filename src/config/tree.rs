//! Dotted-path access and deep merging over YAML mappings.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::base::{Result, SparvError};

/// A configuration tree: a YAML mapping with dotted-path access.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: Mapping,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            _ => Err(SparvError::config("", "top level must be a mapping")),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text).map_err(|e| match e {
            SparvError::Yaml(inner) => {
                SparvError::config(path.display().to_string(), inner.to_string())
            }
            other => other,
        })
    }

    /// Look up a value by dotted path (`section.key` or deeper).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            match current {
                Value::Mapping(map) => current = map.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    /// A list of strings at `path`; a scalar string becomes a one-element
    /// list.
    pub fn get_string_list(&self, path: &str) -> Option<Vec<String>> {
        match self.get(path)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Sequence(seq) => Some(
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value by dotted path, creating intermediate mappings.
    pub fn set(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = path.split('.').collect();
        set_in(&mut self.root, &parts, value);
    }

    /// Fill in every key of `defaults` that this tree leaves unset.
    ///
    /// Mappings merge recursively; scalars and sequences already present
    /// win unchanged.
    pub fn merge_defaults(&mut self, defaults: &ConfigTree) {
        merge_mapping(&mut self.root, &defaults.root);
    }

    /// Every leaf path (dotted) present in the tree.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaves(&self.root, String::new(), &mut out);
        out
    }

    /// Immediate child keys of a mapping at `path` (empty path = root).
    pub fn keys(&self, path: &str) -> Vec<String> {
        let map = if path.is_empty() {
            Some(&self.root)
        } else {
            match self.get(path) {
                Some(Value::Mapping(m)) => Some(m),
                _ => None,
            }
        };
        map.map(|m| {
            m.keys()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn as_value(&self) -> Value {
        Value::Mapping(self.root.clone())
    }
}

fn set_in(map: &mut Mapping, parts: &[&str], value: Value) {
    let key = Value::String(parts[0].to_owned());
    if parts.len() == 1 {
        map.insert(key, value);
        return;
    }
    let entry = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !matches!(entry, Value::Mapping(_)) {
        *entry = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(inner) = entry {
        set_in(inner, &parts[1..], value);
    }
}

fn merge_mapping(target: &mut Mapping, defaults: &Mapping) {
    for (key, default_value) in defaults {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default_value.clone());
            }
            Some(existing) => {
                if let (Value::Mapping(existing), Value::Mapping(default_map)) =
                    (existing, default_value)
                {
                    merge_mapping(existing, default_map);
                }
            }
        }
    }
}

fn collect_leaves(map: &Mapping, prefix: String, out: &mut Vec<String>) {
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        let path = if prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Mapping(inner) if !inner.is_empty() => {
                collect_leaves(inner, path, out);
            }
            _ => out.push(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_get() {
        let tree = ConfigTree::from_str("metadata:\n  language: swe\n").unwrap();
        assert_eq!(tree.get_str("metadata.language"), Some("swe"));
        assert!(tree.get("metadata.missing").is_none());
        assert!(tree.get("missing.language").is_none());
    }

    #[test]
    fn test_scalar_mid_path() {
        let tree = ConfigTree::from_str("a: 1\n").unwrap();
        assert!(tree.get("a.b").is_none());
        assert_eq!(tree.get_u64("a"), Some(1));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut tree = ConfigTree::new();
        tree.set("export.annotations", Value::String("x.y".into()));
        assert_eq!(tree.get_str("export.annotations"), Some("x.y"));
    }

    #[test]
    fn test_merge_defaults_keeps_existing() {
        let mut tree = ConfigTree::from_str("export:\n  annotations: [a.x]\n").unwrap();
        let defaults =
            ConfigTree::from_str("export:\n  annotations: [b.y]\n  compression: gzip\n").unwrap();
        tree.merge_defaults(&defaults);
        assert_eq!(
            tree.get_string_list("export.annotations"),
            Some(vec!["a.x".to_owned()])
        );
        assert_eq!(tree.get_str("export.compression"), Some("gzip"));
    }

    #[test]
    fn test_leaf_paths() {
        let tree = ConfigTree::from_str("a:\n  b: 1\n  c:\n    d: 2\ne: 3\n").unwrap();
        let mut leaves = tree.leaf_paths();
        leaves.sort();
        assert_eq!(leaves, vec!["a.b", "a.c.d", "e"]);
    }

    #[test]
    fn test_string_list_from_scalar() {
        let tree = ConfigTree::from_str("parent: base.yaml\n").unwrap();
        assert_eq!(
            tree.get_string_list("parent"),
            Some(vec!["base.yaml".to_owned()])
        );
    }
}
