//! Sentence segmentation and tokenization.
//!
//! Punctuation-driven splitting, adequate for whitespace-separated
//! languages; an optional abbreviation list keeps sentence breaks out of
//! known abbreviations.

use std::fs;

use crate::base::{Result, Span};
use crate::registry::{Descriptor, FunctionDecl, Registry, TaskContext};

const ABBREV_MODEL: &str = "segment/abbrev.txt";

/// Default abbreviation list written by the model builder.
const DEFAULT_ABBREVS: &str = "bl.a.\ndvs.\netc.\nfr.o.m.\nm.fl.\nosv.\nt.ex.\nt.o.m.\n";

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::annotator("segment:sentence", "Split the corpus text into sentences")
            .param("text", Descriptor::Text)
            .param(
                "model",
                Descriptor::Model {
                    path: ABBREV_MODEL.to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Output {
                    template: "segment.sentence".to_owned(),
                    class: Some("sentence".to_owned()),
                    description: Some("Sentence spans".to_owned()),
                    allow_newlines: false,
                },
            )
            .body(sentence),
    )?;

    registry.register(
        FunctionDecl::annotator("segment:tokenize", "Split sentences into tokens")
            .param("text", Descriptor::Text)
            .param(
                "sentence",
                Descriptor::Annotation {
                    template: "<sentence>".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Output {
                    template: "segment.token".to_owned(),
                    class: Some("token".to_owned()),
                    description: Some("Token spans".to_owned()),
                    allow_newlines: false,
                },
            )
            .body(tokenize),
    )?;

    registry.register(
        FunctionDecl::modelbuilder("segment:abbrev_model", "Write the abbreviation list")
            .param(
                "out",
                Descriptor::ModelOutput {
                    path: ABBREV_MODEL.to_owned(),
                },
            )
            .body(|ctx| {
                let path = ctx.model_path("out")?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, DEFAULT_ABBREVS)?;
                Ok(())
            }),
    )
}

fn sentence(ctx: &mut TaskContext) -> Result<()> {
    let text = ctx.text()?;
    let abbrevs = load_abbrevs(ctx);
    let chars: Vec<char> = text.chars().collect();
    let spans = split_sentences(&chars, &abbrevs)?;
    ctx.write_spans("out", &spans)
}

/// Split a character buffer into sentence spans.
///
/// A sentence closes at a run of `.`/`!`/`?` followed by whitespace or the
/// end of the text, unless the final dot closes a known abbreviation.
fn split_sentences(chars: &[char], abbrevs: &[String]) -> Result<Vec<Span>> {
    let mut spans = Vec::new();
    let mut start: Option<u64> = None;
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if start.is_none() && !c.is_whitespace() {
            start = Some(i as u64);
        }
        if matches!(c, '.' | '!' | '?') {
            let mut j = i;
            while j + 1 < chars.len() && matches!(chars[j + 1], '.' | '!' | '?') {
                j += 1;
            }
            let followed_by_break = j + 1 >= chars.len() || chars[j + 1].is_whitespace();
            let ends_abbrev = chars[j] == '.' && ends_with_abbrev(chars, j, abbrevs);
            if let Some(s) = start {
                if followed_by_break && !ends_abbrev {
                    spans.push(Span::new(s, j as u64 + 1)?);
                    start = None;
                }
            }
            i = j + 1;
            continue;
        }
        i += 1;
    }
    if let Some(s) = start {
        // Trailing sentence without a terminator.
        let mut end = chars.len();
        while end > s as usize && chars[end - 1].is_whitespace() {
            end -= 1;
        }
        if end > s as usize {
            spans.push(Span::new(s, end as u64)?);
        }
    }
    Ok(spans)
}

fn load_abbrevs(ctx: &TaskContext) -> Vec<String> {
    let Ok(path) = ctx.model_path("model") else {
        return Vec::new();
    };
    match fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Does the text ending at `dot_index` (inclusive) end with one of the
/// abbreviations?
fn ends_with_abbrev(chars: &[char], dot_index: usize, abbrevs: &[String]) -> bool {
    if abbrevs.is_empty() {
        return false;
    }
    let end = dot_index + 1;
    abbrevs.iter().any(|abbrev| {
        let len = abbrev.chars().count();
        if len > end {
            return false;
        }
        chars[end - len..end].iter().collect::<String>() == *abbrev
    })
}

fn tokenize(ctx: &mut TaskContext) -> Result<()> {
    let text = ctx.text()?;
    let sentences = ctx.read_spans("sentence")?;
    let chars: Vec<char> = text.chars().collect();

    let mut tokens = Vec::new();
    for sentence in &sentences {
        let mut i = sentence.start() as usize;
        let end = (sentence.end() as usize).min(chars.len());
        while i < end {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c.is_alphanumeric() {
                let start = i;
                while i < end && chars[i].is_alphanumeric() {
                    i += 1;
                }
                tokens.push(Span::new(start as u64, i as u64)?);
            } else {
                tokens.push(Span::new(i as u64, i as u64 + 1)?);
                i += 1;
            }
        }
    }

    ctx.write_spans("out", &tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    fn bounds(spans: &[Span]) -> Vec<(u64, u64)> {
        spans.iter().map(|s| (s.start(), s.end())).collect()
    }

    #[test]
    fn test_two_sentences() {
        let spans =
            split_sentences(&chars("Ord, ord, ord. Här kommer några fler ord."), &[]).unwrap();
        assert_eq!(bounds(&spans), vec![(0, 14), (15, 41)]);
    }

    #[test]
    fn test_no_terminator_trailing_sentence() {
        let spans = split_sentences(&chars("ingen punkt här"), &[]).unwrap();
        assert_eq!(bounds(&spans), vec![(0, 15)]);
    }

    #[test]
    fn test_empty_text_no_sentences() {
        assert!(split_sentences(&chars(""), &[]).unwrap().is_empty());
        assert!(split_sentences(&chars("   "), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_abbreviation_does_not_split() {
        let abbrevs = vec!["t.ex.".to_owned()];
        let spans = split_sentences(&chars("Se t.ex. nedan. Sen mer."), &abbrevs).unwrap();
        assert_eq!(bounds(&spans), vec![(0, 15), (16, 24)]);
    }

    #[test]
    fn test_internal_dot_does_not_split() {
        let spans = split_sentences(&chars("Version 1.2 är klar."), &[]).unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_ends_with_abbrev() {
        let buffer = chars("Se t.ex. nedan");
        let abbrevs = vec!["t.ex.".to_owned()];
        assert!(ends_with_abbrev(&buffer, 7, &abbrevs));
        assert!(!ends_with_abbrev(&buffer, 4, &abbrevs));
    }
}
