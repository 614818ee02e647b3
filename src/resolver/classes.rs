//! Class binding resolution.
//!
//! A class is a symbolic name (`token`, `sentence`, `token:word`) for an
//! annotation chosen by configuration. Bindings come from, in priority
//! order: the corpus config's `classes` section, preset defaults, and
//! inference — when exactly one registered producer tags an output with
//! the class. Binding values may themselves contain class references, so
//! resolution iterates to a fixed point.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::base::{Annotation, Result, SparvError};
use crate::registry::Registry;

/// Resolved class bindings.
#[derive(Debug, Clone, Default)]
pub struct ClassBindings {
    bindings: IndexMap<String, String>,
    /// Classes bound by inference rather than configuration, so the user
    /// can see what was decided for them.
    inferred: Vec<(String, String)>,
}

impl ClassBindings {
    pub fn get(&self, class: &str) -> Option<&str> {
        self.bindings.get(class).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn inferred(&self) -> &[(String, String)] {
        &self.inferred
    }

    /// Substitute every class reference in an identifier; an unresolved
    /// reference is an error naming the class.
    pub fn resolve(&self, annotation: &Annotation) -> Result<Annotation> {
        let mut current = annotation.clone();
        // Classes may map to identifiers that contain classes themselves.
        for _ in 0..MAX_DEPTH {
            let refs: Vec<String> = current.class_refs().iter().map(|s| (*s).to_string()).collect();
            if refs.is_empty() {
                return Ok(current);
            }
            for class in refs {
                let Some(binding) = self.get(&class) else {
                    return Err(SparvError::UnresolvedClass(class));
                };
                current = current.substitute_class(&class, binding)?;
            }
        }
        Err(SparvError::UnresolvedClass(format!(
            "{annotation} (class bindings nest too deeply)"
        )))
    }
}

const MAX_DEPTH: usize = 16;

/// Compute class bindings from the registry and configuration.
///
/// Pure function of its inputs; diagnostics for inferred bindings are
/// logged and returned on the result.
pub fn resolve_classes(
    registry: &Registry,
    configured: &IndexMap<String, String>,
    language: &str,
) -> Result<ClassBindings> {
    let mut result = ClassBindings::default();

    for (class, value) in configured {
        result.bindings.insert(class.clone(), value.clone());
    }

    // Candidate producers per class, language-filtered.
    let mut candidates: IndexMap<String, FxHashSet<String>> = IndexMap::new();
    for function in registry.functions() {
        if !function.supports_language(language) {
            continue;
        }
        for (template, class) in function.output_templates() {
            if let Some(class) = class {
                candidates
                    .entry(class.to_owned())
                    .or_default()
                    .insert(template.to_owned());
            }
        }
    }

    for (class, templates) in &candidates {
        if result.bindings.contains_key(class) {
            continue;
        }
        if templates.len() == 1 {
            let template = templates.iter().next().cloned().unwrap_or_default();
            debug!(class, binding = %template, "inferred class binding");
            result.inferred.push((class.clone(), template.clone()));
            result.bindings.insert(class.clone(), template);
        } else {
            debug!(
                class,
                candidates = templates.len(),
                "class has several producers and no configured binding"
            );
        }
    }

    // Resolve class references inside binding values to a fixed point.
    for _ in 0..MAX_DEPTH {
        let mut changed = false;
        let snapshot = result.bindings.clone();
        for value in result.bindings.values_mut() {
            let annotation = Annotation::new(value)?;
            let refs: Vec<String> = annotation
                .class_refs()
                .iter()
                .map(|s| (*s).to_string())
                .collect();
            for class in refs {
                if let Some(binding) = snapshot.get(&class) {
                    let substituted = annotation.substitute_class(&class, binding)?;
                    if substituted.as_str() != value {
                        *value = substituted.as_str().to_owned();
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    for (class, value) in &result.bindings {
        if value.contains('<') {
            return Err(SparvError::UnresolvedClass(format!(
                "{class} (binding '{value}' still contains a class reference)"
            )));
        }
    }

    for (class, binding) in &result.inferred {
        info!(class, binding = %binding, "class binding inferred from usage");
    }

    Ok(result)
}
