//! Schema-driven configuration validation.
//!
//! Every configuration option a function reads must be declared: a
//! description, and optionally a default, a datatype, a choice list, a
//! string pattern, numeric bounds, and a conditional dependence on another
//! key. A path referenced in a config but declared by no function is an
//! error.

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_yaml::Value;

use crate::base::{Result, SparvError};

use super::tree::ConfigTree;

/// Expected datatype of a config option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Str,
    Bool,
    Int,
    Float,
    List,
    Map,
}

impl Datatype {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Bool => value.is_bool(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_f64() || value.is_i64() || value.is_u64(),
            Self::List => value.is_sequence(),
            Self::Map => value.is_mapping(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

/// A declared configuration option.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    pub key: String,
    pub description: String,
    pub default: Option<Value>,
    pub datatype: Option<Datatype>,
    pub choices: Vec<String>,
    pub pattern: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// This option is only meaningful when `condition.0` equals
    /// `condition.1`.
    pub condition: Option<(String, Value)>,
}

impl ConfigOption {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            default: None,
            datatype: None,
            choices: Vec::new(),
            pattern: None,
            min: None,
            max: None,
            condition: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = Some(datatype);
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: Value) -> Self {
        self.condition = Some((key.into(), value));
        self
    }

    fn check(&self, value: &Value, tree: &ConfigTree) -> Result<()> {
        if let Some(datatype) = self.datatype {
            if !datatype.matches(value) {
                return Err(SparvError::config(
                    &self.key,
                    format!("expected {}", datatype.as_str()),
                ));
            }
        }
        if !self.choices.is_empty() {
            let Some(s) = value.as_str() else {
                return Err(SparvError::config(&self.key, "expected a string choice"));
            };
            if !self.choices.iter().any(|c| c == s) {
                return Err(SparvError::config(
                    &self.key,
                    format!("'{s}' not one of [{}]", self.choices.join(", ")),
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            if let Some(s) = value.as_str() {
                let re = Regex::new(pattern).map_err(|e| {
                    SparvError::registry(format!("bad pattern for '{}': {e}", self.key))
                })?;
                if !re.is_match(s) {
                    return Err(SparvError::config(
                        &self.key,
                        format!("'{s}' does not match '{pattern}'"),
                    ));
                }
            }
        }
        if self.min.is_some() || self.max.is_some() {
            let Some(n) = value.as_f64() else {
                return Err(SparvError::config(&self.key, "expected a number"));
            };
            if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
                return Err(SparvError::config(
                    &self.key,
                    format!("{n} outside [{:?}, {:?}]", self.min, self.max),
                ));
            }
        }
        if let Some((dep_key, dep_value)) = &self.condition {
            let actual = tree.get(dep_key);
            if actual != Some(dep_value) {
                return Err(SparvError::config(
                    &self.key,
                    format!("only valid when '{dep_key}' is {dep_value:?}"),
                ));
            }
        }
        Ok(())
    }
}

/// Sections a corpus config may use without any function declaring them.
const FREE_SECTIONS: &[&str] = &["metadata", "classes", "custom", "parent"];

/// Options owned by the engine itself rather than any module.
pub fn core_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::new("metadata.language", "Corpus language (ISO 639-3)")
            .with_datatype(Datatype::Str)
            .with_pattern("^[a-z]{3}$"),
        ConfigOption::new("metadata.id", "Corpus identifier")
            .with_datatype(Datatype::Str),
        ConfigOption::new("metadata.name", "Human-readable corpus name"),
        ConfigOption::new("metadata.description", "Corpus description"),
        ConfigOption::new("import.importer", "Importer used for all source files")
            .with_datatype(Datatype::Str)
            .with_pattern("^[a-z0-9_]+:[a-z0-9_]+$"),
        ConfigOption::new("import.source_dir", "Directory holding the source files")
            .with_datatype(Datatype::Str)
            .with_default(Value::String("source".to_owned())),
        ConfigOption::new(
            "export.annotations",
            "Annotations to include in exports (identifiers, presets, classes)",
        )
        .with_datatype(Datatype::List),
        ConfigOption::new(
            "export.source_annotations",
            "Source annotations to keep in exports",
        )
        .with_datatype(Datatype::List),
        ConfigOption::new("export.default", "Targets run when none are given")
            .with_datatype(Datatype::List),
        ConfigOption::new("sparv.compression", "Work-directory compression")
            .with_datatype(Datatype::Str)
            .with_choices(&["gzip", "none"]),
        ConfigOption::new("preload.socket", "Path of the preloader socket")
            .with_datatype(Datatype::Str),
    ]
}

/// Validate a merged configuration against the declared options.
///
/// `module_names` are the registered module namespaces; a leaf path under a
/// module namespace (or a core section) must be declared, anything else is
/// an unknown key.
pub fn validate(
    tree: &ConfigTree,
    options: &[ConfigOption],
    module_names: &FxHashSet<String>,
) -> Result<()> {
    let by_key: FxHashMap<&str, &ConfigOption> =
        options.iter().map(|o| (o.key.as_str(), o)).collect();

    for path in tree.leaf_paths() {
        let section = path.split('.').next().unwrap_or("");
        match by_key.get(path.as_str()) {
            Some(option) => {
                if let Some(value) = tree.get(&path) {
                    option.check(value, tree)?;
                }
            }
            None if FREE_SECTIONS.contains(&section) => {}
            None => {
                let known_section = section == "import"
                    || section == "export"
                    || section == "sparv"
                    || section == "preload"
                    || module_names.contains(section);
                if known_section {
                    return Err(SparvError::config(
                        &path,
                        "unknown option (declared by no function)",
                    ));
                }
                return Err(SparvError::config(
                    &path,
                    format!("unknown section '{section}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Render the full option table as JSON (the `sparv schema` command).
pub fn schema_json(options: &[ConfigOption]) -> serde_json::Value {
    let mut entries = serde_json::Map::new();
    for option in options {
        let mut entry = serde_json::Map::new();
        entry.insert(
            "description".to_owned(),
            serde_json::Value::String(option.description.clone()),
        );
        if let Some(datatype) = option.datatype {
            entry.insert(
                "type".to_owned(),
                serde_json::Value::String(datatype.as_str().to_owned()),
            );
        }
        if let Some(default) = &option.default {
            if let Ok(default) = serde_json::to_value(default) {
                entry.insert("default".to_owned(), default);
            }
        }
        if !option.choices.is_empty() {
            entry.insert(
                "enum".to_owned(),
                serde_json::Value::Array(
                    option
                        .choices
                        .iter()
                        .map(|c| serde_json::Value::String(c.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(pattern) = &option.pattern {
            entry.insert(
                "pattern".to_owned(),
                serde_json::Value::String(pattern.clone()),
            );
        }
        entries.insert(option.key.clone(), serde_json::Value::Object(entry));
    }
    serde_json::Value::Object(entries)
}
