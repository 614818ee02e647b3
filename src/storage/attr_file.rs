//! Attribute file codec and set-valued string encoding.
//!
//! An attribute file holds one value per span, newline-separated. An empty
//! line is the undefined sentinel. Values may contain newlines only when
//! the annotation sets an explicit flag; they are then stored escaped so
//! the file stays line-oriented.
//!
//! Multi-valued attributes wrap their values between an affix character
//! with a delimiter separator: `|a|b|c|`. The empty set is encoded as the
//! empty string.

use crate::base::{Result, SparvError};

/// Default affix character for set-valued attributes.
pub const SET_AFFIX: char = '|';

/// Default delimiter between set values.
pub const SET_DELIMITER: char = '|';

/// Encode one value per line; `None` becomes an empty line.
pub fn encode(values: &[Option<String>], allow_newlines: bool) -> Result<String> {
    let mut out = String::new();
    for value in values {
        match value {
            Some(v) if v.contains('\n') && !allow_newlines => {
                return Err(SparvError::Corrupt(
                    "newline in attribute value without the newline flag".to_owned(),
                ));
            }
            Some(v) if allow_newlines => {
                out.push_str(&v.replace('\\', "\\\\").replace('\n', "\\n"));
            }
            Some(v) => out.push_str(v),
            None => {}
        }
        out.push('\n');
    }
    Ok(out)
}

/// Decode newline-separated values; empty lines become `None`.
pub fn decode(text: &str, allow_newlines: bool) -> Vec<Option<String>> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.is_empty() && text.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .map(|line| {
            if line.is_empty() {
                None
            } else if allow_newlines {
                Some(unescape(line))
            } else {
                Some(line.to_owned())
            }
        })
        .collect()
}

fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Encode a set of values: `|a|b|` with the empty set as the empty string.
pub fn encode_set(values: &[String]) -> String {
    encode_set_with(values, SET_AFFIX, SET_DELIMITER)
}

/// Set encoding with explicit affix and delimiter characters.
pub fn encode_set_with(values: &[String], affix: char, delimiter: char) -> String {
    if values.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push(affix);
    for value in values {
        out.push_str(value);
        out.push(delimiter);
    }
    if delimiter != affix {
        // Trailing delimiter replaced by the closing affix.
        out.pop();
        out.push(affix);
    }
    out
}

/// Decode a set-encoded value; the empty string is the empty set.
pub fn decode_set(value: &str) -> Vec<String> {
    decode_set_with(value, SET_AFFIX, SET_DELIMITER)
}

pub fn decode_set_with(value: &str, affix: char, delimiter: char) -> Vec<String> {
    let stripped = value
        .strip_prefix(affix)
        .and_then(|v| v.strip_suffix(affix))
        .unwrap_or(value);
    if stripped.is_empty() {
        return Vec::new();
    }
    stripped
        .split(delimiter)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_roundtrip() {
        let values = vec![
            Some("NN".to_owned()),
            None,
            Some("VB".to_owned()),
            Some(String::new()),
        ];
        let encoded = encode(&values, false).unwrap();
        // The empty string value collapses into the undefined sentinel.
        let decoded = decode(&encoded, false);
        assert_eq!(
            decoded,
            vec![Some("NN".to_owned()), None, Some("VB".to_owned()), None]
        );
    }

    #[test]
    fn test_newline_rejected_without_flag() {
        let values = vec![Some("a\nb".to_owned())];
        assert!(encode(&values, false).is_err());
    }

    #[test]
    fn test_newline_escaped_with_flag() {
        let values = vec![Some("a\nb".to_owned()), Some("back\\slash".to_owned())];
        let encoded = encode(&values, true).unwrap();
        assert_eq!(encoded.lines().count(), 2);
        assert_eq!(decode(&encoded, true), values);
    }

    #[test]
    fn test_empty_file_is_zero_values() {
        assert_eq!(decode("", false), Vec::<Option<String>>::new());
    }

    #[test]
    fn test_set_encoding() {
        assert_eq!(encode_set(&[]), "");
        assert_eq!(
            encode_set(&["a".to_owned(), "b".to_owned(), "c".to_owned()]),
            "|a|b|c|"
        );
        assert_eq!(decode_set("|a|b|c|"), vec!["a", "b", "c"]);
        assert_eq!(decode_set(""), Vec::<String>::new());
        assert_eq!(decode_set("||"), Vec::<String>::new());
    }
}
