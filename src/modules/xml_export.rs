//! Formatted XML export and its install pair.
//!
//! Reconstructs nested XML from span annotations: source structure first,
//! then the configured export annotations, ordered by span containment.
//! Installed by copying the per-file exports into a target directory.

use std::fs;
use std::path::PathBuf;

use quick_xml::escape::escape;
use serde_yaml::Value;
use tracing::debug;

use crate::base::{Annotation, ExpandedItem, Result, Span, SparvError};
use crate::config::{ConfigOption, Datatype};
use crate::registry::{Descriptor, FunctionDecl, Registry, TaskContext};

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::exporter("xml_export:pretty", "Export formatted XML per source file")
            .param(
                "annotations",
                Descriptor::ExportAnnotations {
                    config_key: "xml_export.annotations".to_owned(),
                },
            )
            .param(
                "source",
                Descriptor::SourceAnnotations {
                    config_key: "xml_export.source_annotations".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Export {
                    template: "xml_export/{file}_export.xml".to_owned(),
                },
            )
            .option(
                ConfigOption::new("xml_export.annotations", "Annotations to export")
                    .with_datatype(Datatype::List),
            )
            .option(
                ConfigOption::new(
                    "xml_export.source_annotations",
                    "Source annotations to keep",
                )
                .with_datatype(Datatype::List),
            )
            .body(pretty),
    )?;

    registry.register(
        FunctionDecl::installer("xml_export:install", "Copy the XML exports to a target directory")
            .param(
                "exports",
                Descriptor::ExportInput {
                    template: "xml_export/{file}_export.xml".to_owned(),
                },
            )
            .param(
                "target",
                Descriptor::Config {
                    key: "xml_export.install_target".to_owned(),
                },
            )
            .param(
                "marker",
                Descriptor::Marker {
                    name: "xml_export.install".to_owned(),
                    output: true,
                },
            )
            .param(
                "paired",
                Descriptor::Marker {
                    name: "xml_export.uninstall".to_owned(),
                    output: false,
                },
            )
            .option(
                ConfigOption::new(
                    "xml_export.install_target",
                    "Directory the XML exports are deployed to",
                )
                .with_datatype(Datatype::Str),
            )
            .body(install),
    )?;

    registry.register(
        FunctionDecl::uninstaller("xml_export:uninstall", "Remove deployed XML exports")
            .param(
                "target",
                Descriptor::Config {
                    key: "xml_export.install_target".to_owned(),
                },
            )
            .param(
                "marker",
                Descriptor::Marker {
                    name: "xml_export.uninstall".to_owned(),
                    output: true,
                },
            )
            .param(
                "paired",
                Descriptor::Marker {
                    name: "xml_export.install".to_owned(),
                    output: false,
                },
            )
            .body(uninstall),
    )
}

/// One element to render: a span plus its name and attribute values.
struct Element {
    span: Span,
    name: String,
    attributes: Vec<(String, String)>,
}

fn pretty(ctx: &mut TaskContext) -> Result<()> {
    let text = ctx.text()?;
    let chars: Vec<char> = text.chars().collect();

    let mut items: Vec<ExpandedItem> = ctx.source_annotations("source")?;
    for item in ctx.export_annotations("annotations")? {
        if !items.iter().any(|i| i.annotation == item.annotation) {
            items.push(item.clone());
        }
    }

    let elements = collect_elements(ctx, &items)?;
    let body = render(&elements, &chars);

    ctx.write_export("out", body.as_bytes())?;
    debug!(file = ctx.file_name()?, elements = elements.len(), "wrote XML export");
    Ok(())
}

/// Read spans and attribute values for every selected annotation.
fn collect_elements(ctx: &TaskContext, items: &[ExpandedItem]) -> Result<Vec<Element>> {
    // Group: base span annotation -> (display name, attribute items).
    let mut bases: Vec<(Annotation, String)> = Vec::new();
    let mut attributes: Vec<(Annotation, ExpandedItem)> = Vec::new();
    for item in items {
        if item.annotation.has_attribute() {
            attributes.push((item.annotation.span(), item.clone()));
        } else {
            let name = item
                .export_name
                .clone()
                .unwrap_or_else(|| display_name(item.annotation.as_str()));
            bases.push((item.annotation.clone(), name));
        }
    }
    // An attribute whose base span is not listed pulls the base in with
    // its default name.
    for (base, _) in &attributes {
        if !bases.iter().any(|(b, _)| b == base) {
            bases.push((base.clone(), display_name(base.as_str())));
        }
    }

    let mut elements = Vec::new();
    for (base, name) in &bases {
        if !ctx.annotation_exists(base)? {
            debug!(annotation = %base, "skipping absent annotation");
            continue;
        }
        let spans = ctx.read_annotation_spans(base)?;
        let mut attr_values: Vec<(String, Vec<Option<String>>)> = Vec::new();
        for (attr_base, item) in &attributes {
            if attr_base != base {
                continue;
            }
            if !ctx.annotation_exists(&item.annotation)? {
                continue;
            }
            let display = item
                .export_name
                .clone()
                .unwrap_or_else(|| attribute_display_name(&item.annotation));
            attr_values.push((display, ctx.read_annotation_attribute(&item.annotation)?));
        }
        for (i, span) in spans.iter().enumerate() {
            let mut attrs = Vec::new();
            for (display, values) in &attr_values {
                if let Some(Some(value)) = values.get(i) {
                    attrs.push((display.clone(), value.clone()));
                }
            }
            elements.push(Element {
                span: *span,
                name: name.clone(),
                attributes: attrs,
            });
        }
    }
    Ok(elements)
}

/// The element name of a span annotation: the part after the module
/// prefix.
fn display_name(annotation: &str) -> String {
    match annotation.split_once('.') {
        Some((_, rest)) => rest.to_owned(),
        None => annotation.to_owned(),
    }
}

/// The attribute name of an attribute annotation: the attribute part with
/// its module prefix stripped.
fn attribute_display_name(annotation: &Annotation) -> String {
    match annotation.attribute_name() {
        Some(attr) => display_name(attr),
        None => annotation.as_str().to_owned(),
    }
}

/// Render the elements as indented XML.
fn render(elements: &[Element], chars: &[char]) -> String {
    let mut order: Vec<usize> = (0..elements.len()).collect();
    // Open order: outer elements first.
    order.sort_by(|&a, &b| {
        let (ea, eb) = (&elements[a], &elements[b]);
        ea.span
            .start()
            .cmp(&eb.span.start())
            .then_with(|| eb.span.end().cmp(&ea.span.end()))
            .then_with(|| ea.span.nest().cmp(&eb.span.nest()))
    });

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut stack: Vec<usize> = Vec::new();
    let mut pos: u64 = 0;

    let flush_text = |out: &mut String, from: u64, to: u64, depth: usize| {
        if to <= from {
            return;
        }
        let slice: String = chars[from as usize..(to as usize).min(chars.len())]
            .iter()
            .collect();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&escape(trimmed));
            out.push('\n');
        }
    };

    for &index in &order {
        let element = &elements[index];
        // Close every open element ending at or before this start.
        while let Some(&top) = stack.last() {
            if elements[top].span.end() <= element.span.start()
                && !elements[top].span.contains(&element.span)
            {
                flush_text(&mut out, pos, elements[top].span.end(), stack.len());
                pos = elements[top].span.end().max(pos);
                stack.pop();
                out.push_str(&"  ".repeat(stack.len()));
                out.push_str(&format!("</{}>\n", elements[top].name));
            } else {
                break;
            }
        }
        flush_text(&mut out, pos, element.span.start(), stack.len());
        pos = element.span.start().max(pos);

        let mut tag = format!("<{}", element.name);
        for (key, value) in &element.attributes {
            tag.push_str(&format!(" {key}=\"{}\"", escape(value)));
        }
        // A leaf candidate: nothing later opens inside it.
        let has_child = order
            .iter()
            .skip_while(|&&o| o != index)
            .skip(1)
            .any(|&o| element.span.contains(&elements[o].span));
        if has_child || element.span.is_empty() {
            if element.span.is_empty() {
                tag.push_str("/>");
                out.push_str(&"  ".repeat(stack.len()));
                out.push_str(&tag);
                out.push('\n');
            } else {
                tag.push('>');
                out.push_str(&"  ".repeat(stack.len()));
                out.push_str(&tag);
                out.push('\n');
                stack.push(index);
            }
        } else {
            // Leaf: inline content.
            tag.push('>');
            let content: String = chars
                [element.span.start() as usize..(element.span.end() as usize).min(chars.len())]
                .iter()
                .collect();
            out.push_str(&"  ".repeat(stack.len()));
            out.push_str(&tag);
            out.push_str(&escape(&content));
            out.push_str(&format!("</{}>\n", element.name));
            pos = element.span.end().max(pos);
        }
    }
    while let Some(top) = stack.pop() {
        flush_text(&mut out, pos, elements[top].span.end(), stack.len() + 1);
        pos = elements[top].span.end().max(pos);
        out.push_str(&"  ".repeat(stack.len()));
        out.push_str(&format!("</{}>\n", elements[top].name));
    }
    out
}

fn install_target(ctx: &TaskContext) -> Result<PathBuf> {
    match ctx.config_value("target")? {
        Value::String(target) => Ok(PathBuf::from(target)),
        _ => Err(SparvError::config(
            "xml_export.install_target",
            "install target directory is not configured",
        )),
    }
}

fn install(ctx: &mut TaskContext) -> Result<()> {
    let target = install_target(ctx)?;
    fs::create_dir_all(&target)?;
    for file in ctx.all_files().to_vec() {
        let source = ctx
            .export_path("exports")?
            .to_string_lossy()
            .replace("{file}", file.as_str());
        let source = PathBuf::from(source);
        let Some(name) = source.file_name() else {
            continue;
        };
        fs::copy(&source, target.join(name))?;
    }
    ctx.remove_marker("paired")?;
    ctx.write_marker("marker")?;
    debug!(target = %target.display(), "installed XML exports");
    Ok(())
}

fn uninstall(ctx: &mut TaskContext) -> Result<()> {
    let target = install_target(ctx)?;
    for file in ctx.all_files().to_vec() {
        let path = target.join(format!("{file}_export.xml"));
        if path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    ctx.remove_marker("paired")?;
    ctx.write_marker("marker")?;
    debug!(target = %target.display(), "removed installed XML exports");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Fraction;

    fn element(start: u64, end: u64, name: &str) -> Element {
        Element {
            span: Span::new(start, end).unwrap(),
            name: name.to_owned(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_render_nested() {
        let text: Vec<char> = "Hej du".chars().collect();
        let elements = vec![
            element(0, 6, "text"),
            element(0, 6, "sentence"),
            element(0, 3, "token"),
            element(4, 6, "token"),
        ];
        // sentence shares bounds with text; nesting fraction orders it
        // inside.
        let mut elements = elements;
        elements[1].span = Span::with_nesting(0, 6, Fraction::for_depth(1)).unwrap();
        let xml = render(&elements, &text);
        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
            <text>\n  <sentence>\n    <token>Hej</token>\n    <token>du</token>\n  </sentence>\n</text>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_render_attributes_escaped() {
        let text: Vec<char> = "a".chars().collect();
        let elements = vec![Element {
            span: Span::new(0, 1).unwrap(),
            name: "token".to_owned(),
            attributes: vec![("word".to_owned(), "a<b".to_owned())],
        }];
        let xml = render(&elements, &text);
        assert!(xml.contains("<token word=\"a&lt;b\">a</token>"));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(display_name("segment.sentence"), "sentence");
        assert_eq!(display_name("text"), "text");
        let word = Annotation::new("segment.token:misc.word").unwrap();
        assert_eq!(attribute_display_name(&word), "word");
    }
}
