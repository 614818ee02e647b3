//! XML importer.
//!
//! Preserves the element and attribute structure of the source as span
//! and attribute annotations: every element name becomes a span
//! annotation, every XML attribute an attribute annotation on it. Element
//! names are lowercased, and namespace prefixes are encoded as
//! `prefix+local`. Elements listed as header elements keep their content
//! out of the corpus text; the raw inner text is stored on the header
//! span instead.

use std::fs;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_yaml::Value;
use tracing::debug;

use crate::base::{Annotation, Fraction, Result, Span, SparvError};
use crate::config::{ConfigOption, Datatype};
use crate::registry::{Descriptor, FunctionDecl, Registry, TaskContext};

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::importer("xml_import:parse", "Import XML files, preserving structure")
            .param("source", Descriptor::Source)
            .param(
                "header_elements",
                Descriptor::Config {
                    key: "xml_import.header_elements".to_owned(),
                },
            )
            .option(
                ConfigOption::new(
                    "xml_import.header_elements",
                    "Elements whose content is metadata, excluded from the corpus text",
                )
                .with_datatype(Datatype::List),
            )
            .body(parse),
    )
}

/// One open element while walking the document.
struct OpenElement {
    name: String,
    start: u64,
    depth: u32,
    attributes: Vec<(String, String)>,
    /// Collected raw content for header elements.
    header_text: Option<String>,
}

/// Everything recorded for one element occurrence.
struct Occurrence {
    span: Span,
    attributes: Vec<(String, String)>,
    header_text: Option<String>,
}

fn parse(ctx: &mut TaskContext) -> Result<()> {
    let path = ctx.source_path()?;
    let raw = fs::read_to_string(&path)?;

    let header_elements: Vec<String> = match ctx.config_value("header_elements")? {
        Value::Sequence(seq) => seq
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect(),
        _ => Vec::new(),
    };

    // The default reader config keeps text untrimmed, which is exactly
    // what offset bookkeeping needs.
    let mut reader = Reader::from_str(&raw);

    let mut text = String::new();
    let mut char_len: u64 = 0;
    let mut stack: Vec<OpenElement> = Vec::new();
    // Element name -> recorded occurrences, in first-seen order.
    let mut elements: IndexMap<String, Vec<Occurrence>> = IndexMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = open_element(&start, char_len, stack.len() as u32, &header_elements)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = open_element(&start, char_len, stack.len() as u32, &header_elements)?;
                record(&mut elements, element, char_len)?;
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err(SparvError::xml(format!(
                        "unbalanced end tag in {}",
                        path.display()
                    )));
                };
                record(&mut elements, element, char_len)?;
            }
            Ok(Event::Text(t)) => {
                let content = t
                    .unescape()
                    .map_err(|e| SparvError::xml(e.to_string()))?;
                let in_header = stack.iter().any(|e| e.header_text.is_some());
                if in_header {
                    if let Some(open) = stack
                        .iter_mut()
                        .rev()
                        .find(|e| e.header_text.is_some())
                    {
                        if let Some(buffer) = open.header_text.as_mut() {
                            buffer.push_str(&content);
                        }
                    }
                } else {
                    char_len += content.chars().count() as u64;
                    text.push_str(&content);
                }
            }
            Ok(Event::CData(data)) => {
                let content = String::from_utf8_lossy(&data).into_owned();
                char_len += content.chars().count() as u64;
                text.push_str(&content);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SparvError::xml(format!("{}: {e}", path.display())));
            }
        }
    }
    if !stack.is_empty() {
        return Err(SparvError::xml(format!(
            "unclosed element in {}",
            path.display()
        )));
    }

    ctx.write_text(&text)?;

    // Write one span annotation per element name, with one attribute
    // annotation per XML attribute seen on it.
    let mut structure: Vec<Annotation> = Vec::new();
    for (name, mut occurrences) in elements {
        occurrences.sort_by(|a, b| a.span.cmp(&b.span));
        let annotation = Annotation::new(&name)?;
        let spans: Vec<Span> = occurrences.iter().map(|o| o.span).collect();
        ctx.write_source_spans(&annotation, &spans)?;
        structure.push(annotation.clone());

        let mut attr_names: Vec<String> = Vec::new();
        for occurrence in &occurrences {
            for (attr, _) in &occurrence.attributes {
                if !attr_names.contains(attr) {
                    attr_names.push(attr.clone());
                }
            }
            if occurrence.header_text.is_some() && !attr_names.contains(&CONTENT_ATTR.to_owned()) {
                attr_names.push(CONTENT_ATTR.to_owned());
            }
        }
        for attr in attr_names {
            let full = Annotation::new(&format!("{name}:{attr}"))?;
            let values: Vec<Option<String>> = occurrences
                .iter()
                .map(|o| {
                    if attr == CONTENT_ATTR {
                        o.header_text.clone()
                    } else {
                        o.attributes
                            .iter()
                            .find(|(a, _)| a == &attr)
                            .map(|(_, v)| v.clone())
                    }
                })
                .collect();
            ctx.write_source_attribute(&full, &values)?;
            structure.push(full);
        }
    }
    ctx.write_structure(&structure)?;
    debug!(file = ctx.file_name()?, annotations = structure.len(), "imported");
    Ok(())
}

/// Attribute under which a header element's raw content is kept.
const CONTENT_ATTR: &str = "content";

fn open_element(
    start: &BytesStart,
    offset: u64,
    depth: u32,
    header_elements: &[String],
) -> Result<OpenElement> {
    let name = decode_name(start.name().as_ref());
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SparvError::xml(e.to_string()))?;
        let key = decode_name(attr.key.as_ref());
        let value = attr
            .unescape_value()
            .map_err(|e| SparvError::xml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    let is_header = header_elements.iter().any(|h| h == &name);
    Ok(OpenElement {
        name,
        start: offset,
        depth,
        attributes,
        header_text: is_header.then(String::new),
    })
}

fn record(
    elements: &mut IndexMap<String, Vec<Occurrence>>,
    element: OpenElement,
    end: u64,
) -> Result<()> {
    // Header elements swallow their content, so their span is zero-width
    // at the recorded position.
    let end = if element.header_text.is_some() {
        element.start
    } else {
        end
    };
    let span = Span::with_nesting(element.start, end, Fraction::for_depth(element.depth))?;
    elements
        .entry(element.name.clone())
        .or_default()
        .push(Occurrence {
            span,
            attributes: element.attributes,
            header_text: element.header_text,
        });
    Ok(())
}

/// Lowercase an element or attribute name, encoding a namespace prefix as
/// `prefix+local`.
fn decode_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw).to_lowercase();
    name.replace(':', "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_name() {
        assert_eq!(decode_name(b"Text"), "text");
        assert_eq!(decode_name(b"xi:include"), "xi+include");
    }
}
