//! Class and wildcard resolution.
//!
//! Turns the registry plus the merged configuration into a set of
//! materialized rules: `<class>` references become concrete identifiers,
//! config values are snapshotted, and wildcard-bearing functions become
//! rule templates instantiated on demand by the graph builder.

mod classes;
mod rules;

pub use classes::{ClassBindings, resolve_classes};
pub use rules::{Artifact, InputRef, Rule, RuleScope, RuleSet, build_rules};
