//! Annotation identifier algebra.
//!
//! An annotation identifier names either a span annotation (`module.name`)
//! or an attribute attached to one (`module.name:module.attr`). The base
//! part may be a class reference (`<token>`), and a whole identifier may be
//! a class reference to an attribute (`<token:word>`). `{placeholder}`
//! parts are wildcards bound at graph-build time.

use smol_str::SmolStr;

use super::error::{Result, SparvError};

/// Separator between the base span and its attribute.
pub const ATTR_SEP: char = ':';

/// Prefix marking user-local definitions.
pub const CUSTOM_PREFIX: &str = "custom.";

/// A validated annotation identifier.
///
/// Cheap to clone; comparison and hashing use the full textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Annotation {
    name: SmolStr,
}

impl Annotation {
    /// Parse and validate an identifier.
    ///
    /// Accepted characters: lowercase ASCII letters, digits and
    /// `_ . : < > + { } - /`. The attribute separator may appear at most
    /// once outside class brackets; class and wildcard brackets must be
    /// balanced and non-empty.
    pub fn new(name: &str) -> Result<Self> {
        validate(name)?;
        Ok(Self {
            name: SmolStr::new(name),
        })
    }

    /// The full textual form.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Split into base span and optional attribute.
    ///
    /// The split is on the first `:` outside class brackets, so
    /// `<token>:misc.word` splits into `<token>` and `misc.word`, while
    /// `<token:word>` is a single class reference with no split.
    pub fn split(&self) -> (&str, Option<&str>) {
        match attr_sep_position(&self.name) {
            Some(i) => (&self.name[..i], Some(&self.name[i + 1..])),
            None => (self.name.as_str(), None),
        }
    }

    /// The span annotation this identifier attaches to.
    ///
    /// For a pure span this is the identifier itself.
    pub fn span(&self) -> Annotation {
        let (base, _) = self.split();
        Annotation {
            name: SmolStr::new(base),
        }
    }

    /// The attribute part, if any.
    pub fn attribute_name(&self) -> Option<&str> {
        self.split().1
    }

    /// True when the identifier carries an attribute part.
    pub fn has_attribute(&self) -> bool {
        self.attribute_name().is_some()
    }

    /// The class name when the whole identifier is a class reference
    /// (`<token>` or `<token:word>`).
    pub fn class_ref(&self) -> Option<&str> {
        let s = self.name.as_str();
        if s.starts_with('<') && s.ends_with('>') && !s[1..s.len() - 1].contains(['<', '>']) {
            Some(&s[1..s.len() - 1])
        } else {
            None
        }
    }

    /// All class references occurring anywhere in the identifier.
    pub fn class_refs(&self) -> Vec<&str> {
        bracketed(&self.name, '<', '>')
    }

    /// All `{placeholder}` wildcards occurring in the identifier.
    pub fn wildcards(&self) -> Vec<&str> {
        bracketed(&self.name, '{', '}')
    }

    /// True when the identifier contains at least one wildcard.
    pub fn has_wildcards(&self) -> bool {
        self.name.contains('{')
    }

    /// True when the identifier contains at least one class reference.
    pub fn has_class_refs(&self) -> bool {
        self.name.contains('<')
    }

    /// The module prefix of the base span (text before the first `.`).
    ///
    /// Empty for class references.
    pub fn module(&self) -> &str {
        let (base, _) = self.split();
        if base.starts_with('<') {
            ""
        } else {
            base.split('.').next().unwrap_or("")
        }
    }

    /// True for user-local (`custom.`) definitions.
    pub fn is_custom(&self) -> bool {
        self.name.starts_with(CUSTOM_PREFIX)
    }

    /// Replace every `<class>` occurrence with a concrete binding.
    pub fn substitute_class(&self, class: &str, binding: &str) -> Result<Annotation> {
        let needle = format!("<{class}>");
        if !self.name.contains(needle.as_str()) {
            return Ok(self.clone());
        }
        Annotation::new(&self.name.replace(needle.as_str(), binding))
    }

    /// Replace every `{placeholder}` occurrence with its bound value.
    ///
    /// Placeholders without a binding are left in place; callers decide
    /// whether a remaining wildcard is an error.
    pub fn bind_wildcards<'a>(
        &self,
        bindings: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<Annotation> {
        let mut out = self.name.to_string();
        for wc in self.wildcards() {
            if let Some(value) = bindings(wc) {
                out = out.replace(&format!("{{{wc}}}"), value);
            }
        }
        Annotation::new(&out)
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::str::FromStr for Annotation {
    type Err = SparvError;

    fn from_str(s: &str) -> Result<Self> {
        Annotation::new(s)
    }
}

/// Position of the attribute separator outside class brackets, if any.
fn attr_sep_position(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ATTR_SEP if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Extract the contents of every `open...close` pair.
fn bracketed<'a>(s: &'a str, open: char, close: char) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        if c == open {
            start = Some(i + open.len_utf8());
        } else if c == close {
            if let Some(from) = start.take() {
                found.push(&s[from..i]);
            }
        }
    }
    found
}

fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SparvError::name(name, "empty identifier"));
    }
    for c in name.chars() {
        let ok = c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || matches!(c, '_' | '.' | ':' | '<' | '>' | '+' | '{' | '}' | '-' | '/');
        if !ok {
            return Err(SparvError::name(
                name,
                format!("character '{c}' outside the accepted set"),
            ));
        }
    }
    let mut angle = 0i32;
    let mut brace = 0i32;
    for c in name.chars() {
        match c {
            '<' => angle += 1,
            '>' => angle -= 1,
            '{' => brace += 1,
            '}' => brace -= 1,
            _ => {}
        }
        if angle < 0 || brace < 0 {
            return Err(SparvError::name(name, "unbalanced brackets"));
        }
    }
    if angle != 0 || brace != 0 {
        return Err(SparvError::name(name, "unbalanced brackets"));
    }
    if name.contains("<>") || name.contains("{}") {
        return Err(SparvError::name(name, "empty bracket pair"));
    }
    if let Some(i) = attr_sep_position(name) {
        if i == 0 {
            return Err(SparvError::name(name, "empty base span"));
        }
        let attr = &name[i + 1..];
        if attr.is_empty() {
            return Err(SparvError::name(name, "empty attribute"));
        }
        if attr_sep_position(attr).is_some() {
            return Err(SparvError::name(name, "more than one attribute separator"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_span() {
        let a = Annotation::new("segment.token").unwrap();
        assert_eq!(a.split(), ("segment.token", None));
        assert_eq!(a.span(), a);
        assert_eq!(a.module(), "segment");
        assert!(!a.has_attribute());
    }

    #[test]
    fn test_attribute_split() {
        let a = Annotation::new("segment.token:misc.word").unwrap();
        assert_eq!(a.split(), ("segment.token", Some("misc.word")));
        assert_eq!(a.span().as_str(), "segment.token");
        assert_eq!(a.attribute_name(), Some("misc.word"));
    }

    #[test]
    fn test_class_reference() {
        let a = Annotation::new("<token>").unwrap();
        assert_eq!(a.class_ref(), Some("token"));
        let b = Annotation::new("<token:word>").unwrap();
        assert_eq!(b.class_ref(), Some("token:word"));
        // Attribute on a class base is not itself a class reference
        let c = Annotation::new("<token>:misc.word").unwrap();
        assert_eq!(c.class_ref(), None);
        assert_eq!(c.split(), ("<token>", Some("misc.word")));
        assert_eq!(c.class_refs(), vec!["token"]);
    }

    #[test]
    fn test_class_ref_with_attr_does_not_split() {
        let a = Annotation::new("<token:word>").unwrap();
        assert_eq!(a.split(), ("<token:word>", None));
        assert!(!a.has_attribute());
    }

    #[test]
    fn test_wildcards() {
        let a = Annotation::new("{annotation}:misc.{attr}").unwrap();
        assert_eq!(a.wildcards(), vec!["annotation", "attr"]);
        let bound = a
            .bind_wildcards(|w| match w {
                "annotation" => Some("segment.token"),
                "attr" => Some("word"),
                _ => None,
            })
            .unwrap();
        assert_eq!(bound.as_str(), "segment.token:misc.word");
    }

    #[test]
    fn test_substitute_class() {
        let a = Annotation::new("<token>:misc.word").unwrap();
        let c = a.substitute_class("token", "segment.token").unwrap();
        assert_eq!(c.as_str(), "segment.token:misc.word");
    }

    #[test]
    fn test_custom_prefix() {
        assert!(Annotation::new("custom.geo:location").unwrap().is_custom());
        assert!(!Annotation::new("segment.token").unwrap().is_custom());
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(Annotation::new("").is_err());
        assert!(Annotation::new("Upper.case").is_err());
        assert!(Annotation::new("seg ment").is_err());
        assert!(Annotation::new("a:").is_err());
        assert!(Annotation::new(":attr").is_err());
        assert!(Annotation::new("a:b:c").is_err());
        assert!(Annotation::new("<token").is_err());
        assert!(Annotation::new("{}").is_err());
    }
}
