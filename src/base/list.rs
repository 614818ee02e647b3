//! `not` / `as` / `...` directives in annotation lists.
//!
//! Export and source annotation lists are processed in order: plain entries
//! include one annotation, `X as Y` includes it under an export name,
//! `not X` excludes, and `...` splices in every candidate not otherwise
//! listed or excluded.

use rustc_hash::FxHashSet;

use super::error::{Result, SparvError};
use super::name::Annotation;

/// The literal "everything else" entry.
pub const REST: &str = "...";

const NOT_KEYWORD: &str = "not ";
const AS_KEYWORD: &str = " as ";

/// One parsed entry of an annotation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    /// Plain inclusion, optionally renamed (`X as Y`).
    Include {
        name: String,
        rename: Option<String>,
    },
    /// Exclusion (`not X`).
    Exclude(String),
    /// Everything else (`...`).
    Rest,
}

impl ListItem {
    /// Parse one list entry.
    pub fn parse(entry: &str) -> ListItem {
        let entry = entry.trim();
        if entry == REST {
            return ListItem::Rest;
        }
        if let Some(rest) = entry.strip_prefix(NOT_KEYWORD) {
            return ListItem::Exclude(rest.trim().to_owned());
        }
        if let Some((name, rename)) = entry.split_once(AS_KEYWORD) {
            return ListItem::Include {
                name: name.trim().to_owned(),
                rename: Some(rename.trim().to_owned()),
            };
        }
        ListItem::Include {
            name: entry.to_owned(),
            rename: None,
        }
    }
}

/// An annotation selected by list expansion, with its optional export name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedItem {
    pub annotation: Annotation,
    pub export_name: Option<String>,
}

impl ExpandedItem {
    /// Render back to list-entry form, preserving any rename.
    pub fn render(&self) -> String {
        match &self.export_name {
            Some(name) => format!("{} as {}", self.annotation, name),
            None => self.annotation.to_string(),
        }
    }
}

/// Evaluate a list of entries against the full candidate set.
///
/// Entries are processed in order. `...` expands to all candidates not
/// already listed and not excluded, in candidate order. An empty input list
/// produces an empty output; without `...` only explicitly listed items
/// remain. A list containing a negation but no inclusion and no `...` is an
/// error rather than a silently empty result. Renames must not collide.
///
/// Expansion is idempotent: feeding the rendered output back in yields the
/// same result.
pub fn expand_in_list(entries: &[String], candidates: &[Annotation]) -> Result<Vec<ExpandedItem>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<ListItem> = entries.iter().map(|e| ListItem::parse(e)).collect();

    let has_inclusion = items
        .iter()
        .any(|i| matches!(i, ListItem::Include { .. } | ListItem::Rest));
    if !has_inclusion {
        return Err(SparvError::config(
            "annotations",
            "list contains only negations; add at least one annotation or '...'",
        ));
    }

    let excluded: FxHashSet<&str> = items
        .iter()
        .filter_map(|i| match i {
            ListItem::Exclude(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();

    let mut listed: FxHashSet<String> = FxHashSet::default();
    for item in &items {
        if let ListItem::Include { name, .. } = item {
            listed.insert(name.clone());
        }
    }

    let mut out = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for item in &items {
        match item {
            ListItem::Include { name, rename } => {
                if excluded.contains(name.as_str()) || !seen.insert(name.clone()) {
                    continue;
                }
                out.push(ExpandedItem {
                    annotation: Annotation::new(name)?,
                    export_name: rename.clone(),
                });
            }
            ListItem::Exclude(_) => {}
            ListItem::Rest => {
                for candidate in candidates {
                    let name = candidate.as_str();
                    if excluded.contains(name) || listed.contains(name) || seen.contains(name) {
                        continue;
                    }
                    seen.insert(name.to_owned());
                    out.push(ExpandedItem {
                        annotation: candidate.clone(),
                        export_name: None,
                    });
                }
            }
        }
    }

    let mut names: FxHashSet<&str> = FxHashSet::default();
    for item in &out {
        let exported = item
            .export_name
            .as_deref()
            .unwrap_or_else(|| item.annotation.as_str());
        if !names.insert(exported) {
            return Err(SparvError::config(
                "annotations",
                format!("rename collision on '{exported}'"),
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anns(names: &[&str]) -> Vec<Annotation> {
        names.iter().map(|n| Annotation::new(n).unwrap()).collect()
    }

    fn strs(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(ListItem::parse("..."), ListItem::Rest);
        assert_eq!(
            ListItem::parse("not segment.token"),
            ListItem::Exclude("segment.token".into())
        );
        assert_eq!(
            ListItem::parse("segment.token as token"),
            ListItem::Include {
                name: "segment.token".into(),
                rename: Some("token".into()),
            }
        );
    }

    #[test]
    fn test_explicit_list_only() {
        let cands = anns(&["a.x", "b.y", "c.z"]);
        let out = expand_in_list(&strs(&["b.y"]), &cands).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].annotation.as_str(), "b.y");
    }

    #[test]
    fn test_rest_fills_in_candidate_order() {
        let cands = anns(&["a.x", "b.y", "c.z"]);
        let out = expand_in_list(&strs(&["b.y", "..."]), &cands).unwrap();
        let names: Vec<&str> = out.iter().map(|i| i.annotation.as_str()).collect();
        assert_eq!(names, vec!["b.y", "a.x", "c.z"]);
    }

    #[test]
    fn test_negation_excludes_from_rest() {
        let cands = anns(&["a.x", "b.y", "c.z"]);
        let out = expand_in_list(&strs(&["...", "not b.y"]), &cands).unwrap();
        let names: Vec<&str> = out.iter().map(|i| i.annotation.as_str()).collect();
        assert_eq!(names, vec!["a.x", "c.z"]);
    }

    #[test]
    fn test_negation_only_is_error() {
        let cands = anns(&["a.x"]);
        assert!(expand_in_list(&strs(&["not a.x"]), &cands).is_err());
    }

    #[test]
    fn test_empty_list_is_empty() {
        let cands = anns(&["a.x"]);
        assert!(expand_in_list(&[], &cands).unwrap().is_empty());
    }

    #[test]
    fn test_rename_collision() {
        let cands = anns(&["a.x", "b.y"]);
        assert!(expand_in_list(&strs(&["a.x as t", "b.y as t"]), &cands).is_err());
    }

    #[test]
    fn test_idempotent() {
        let cands = anns(&["a.x", "b.y", "c.z"]);
        let first = expand_in_list(&strs(&["b.y as u", "...", "not c.z"]), &cands).unwrap();
        let rendered: Vec<String> = first.iter().map(ExpandedItem::render).collect();
        let second = expand_in_list(&rendered, &cands).unwrap();
        assert_eq!(first, second);
    }
}
