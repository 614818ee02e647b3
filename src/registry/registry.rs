//! The function registry.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

use crate::base::{Result, SparvError};
use crate::config::ConfigOption;

use super::function::{FunctionDecl, FunctionKind};

/// All registered functions, in registration order.
#[derive(Default)]
pub struct Registry {
    functions: IndexMap<SmolStr, Arc<FunctionDecl>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one function declaration.
    ///
    /// Rejects duplicate ids, missing bodies, and a second producer of an
    /// identifier template already produced with the same `order`.
    pub fn register(&mut self, decl: FunctionDecl) -> Result<()> {
        if decl.body.is_none() {
            return Err(SparvError::registry(format!(
                "function '{}' has no body",
                decl.id
            )));
        }
        if !decl.id.contains(':') {
            return Err(SparvError::registry(format!(
                "function id '{}' must have the form module:function",
                decl.id
            )));
        }
        if self.functions.contains_key(&decl.id) {
            return Err(SparvError::registry(format!(
                "function '{}' registered twice",
                decl.id
            )));
        }
        for (template, _) in decl.output_templates() {
            for existing in self.functions.values() {
                for (other, _) in existing.output_templates() {
                    if template == other && existing.order == decl.order {
                        return Err(SparvError::registry(format!(
                            "'{}' and '{}' both produce '{template}' with order {}",
                            existing.id, decl.id, decl.order
                        )));
                    }
                }
            }
        }
        debug!(id = %decl.id, kind = %decl.kind, "registered function");
        self.functions.insert(decl.id.clone(), Arc::new(decl));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<FunctionDecl>> {
        self.functions.get(id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDecl>> {
        self.functions.values()
    }

    /// Functions of one kind, registration order.
    pub fn of_kind(&self, kind: FunctionKind) -> impl Iterator<Item = &Arc<FunctionDecl>> {
        self.functions.values().filter(move |f| f.kind == kind)
    }

    /// Sorted unique module namespaces.
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self
            .functions
            .values()
            .map(|f| f.module())
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        modules.sort_unstable();
        modules
    }

    /// Module namespaces as an owned set (for config validation).
    pub fn module_set(&self) -> FxHashSet<String> {
        self.functions
            .values()
            .map(|f| f.module().to_owned())
            .collect()
    }

    /// Every declared config option: the engine's own plus per-function.
    pub fn all_options(&self) -> Vec<ConfigOption> {
        let mut options = crate::config::core_options();
        let mut seen: FxHashSet<String> = options.iter().map(|o| o.key.clone()).collect();
        for function in self.functions.values() {
            for option in &function.options {
                if seen.insert(option.key.clone()) {
                    options.push(option.clone());
                }
            }
        }
        options
    }

    /// Declared option keys of importers/exporters, for section inheritance.
    pub fn inheritable_option_keys(&self) -> Vec<(String, bool)> {
        let mut keys = Vec::new();
        for function in self.functions.values() {
            let is_importer = match function.kind {
                FunctionKind::Importer => true,
                FunctionKind::Exporter => false,
                _ => continue,
            };
            for option in &function.options {
                keys.push((option.key.clone(), is_importer));
            }
        }
        keys
    }

    /// Languages mentioned across all whitelists.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self
            .functions
            .values()
            .flat_map(|f| f.languages.iter().map(SmolStr::as_str))
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        languages.sort_unstable();
        languages
    }

    /// Functions grouped by module, for the `sparv modules` listing.
    pub fn by_module(&self) -> FxHashMap<&str, Vec<&Arc<FunctionDecl>>> {
        let mut map: FxHashMap<&str, Vec<&Arc<FunctionDecl>>> = FxHashMap::default();
        for function in self.functions.values() {
            map.entry(function.module()).or_default().push(function);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Descriptor;

    fn noop_annotator(id: &str, output: &str, order: u16) -> FunctionDecl {
        FunctionDecl::annotator(id, "test annotator")
            .order(order)
            .param(
                "out",
                Descriptor::Output {
                    template: output.to_owned(),
                    class: None,
                    description: None,
                    allow_newlines: false,
                },
            )
            .body(|_| Ok(()))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry
            .register(noop_annotator("misc:word", "segment.token:misc.word", 1))
            .unwrap();
        assert!(registry.get("misc:word").is_some());
        assert_eq!(registry.modules(), vec!["misc"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = Registry::new();
        registry
            .register(noop_annotator("misc:word", "a.x", 1))
            .unwrap();
        assert!(registry
            .register(noop_annotator("misc:word", "b.y", 2))
            .is_err());
    }

    #[test]
    fn test_same_output_same_order_rejected() {
        let mut registry = Registry::new();
        registry
            .register(noop_annotator("one:pos", "<token>:one.pos", 1))
            .unwrap();
        let err = registry.register(noop_annotator("two:pos", "<token>:one.pos", 1));
        assert!(err.is_err());
    }

    #[test]
    fn test_same_output_distinct_order_allowed() {
        let mut registry = Registry::new();
        registry
            .register(noop_annotator("one:pos", "<token>:shared.pos", 1))
            .unwrap();
        registry
            .register(noop_annotator("two:pos", "<token>:shared.pos", 2))
            .unwrap();
    }

    #[test]
    fn test_missing_body_rejected() {
        let mut registry = Registry::new();
        let decl = FunctionDecl::annotator("misc:broken", "no body");
        assert!(registry.register(decl).is_err());
    }
}
