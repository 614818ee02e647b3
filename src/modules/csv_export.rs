//! Column (CSV) export: one token per row, sentences separated by blank
//! lines.

use tracing::debug;

use crate::base::Result;
use crate::config::{ConfigOption, Datatype};
use crate::registry::{Descriptor, FunctionDecl, Registry, TaskContext};
use crate::storage::find_children;

const DELIMITER: char = '\t';

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::exporter("csv_export:csv", "Export a token-per-row column file")
            .param(
                "token",
                Descriptor::Annotation {
                    template: "<token>".to_owned(),
                },
            )
            .param(
                "sentence",
                Descriptor::Annotation {
                    template: "<sentence>".to_owned(),
                },
            )
            .param(
                "annotations",
                Descriptor::ExportAnnotations {
                    config_key: "csv_export.annotations".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Export {
                    template: "csv_export/{file}.csv".to_owned(),
                },
            )
            .option(
                ConfigOption::new("csv_export.annotations", "Annotations to export as columns")
                    .with_datatype(Datatype::List),
            )
            .body(export),
    )
}

fn export(ctx: &mut TaskContext) -> Result<()> {
    let text = ctx.text()?;
    let chars: Vec<char> = text.chars().collect();
    let tokens = ctx.read_spans("token")?;
    let sentences = ctx.read_spans("sentence")?;
    let token_base = ctx.annotation("token")?.clone();

    // Columns: token text, then every token-attached attribute from the
    // configured list.
    let mut columns: Vec<(String, Vec<Option<String>>)> = Vec::new();
    for item in ctx.export_annotations("annotations")? {
        if !item.annotation.has_attribute() || item.annotation.span() != token_base {
            continue;
        }
        if !ctx.annotation_exists(&item.annotation)? {
            continue;
        }
        let header = item.export_name.clone().unwrap_or_else(|| {
            item.annotation
                .attribute_name()
                .unwrap_or(item.annotation.as_str())
                .to_owned()
        });
        columns.push((header, ctx.read_annotation_attribute(&item.annotation)?));
    }

    let mut out = String::from("token");
    for (header, _) in &columns {
        out.push(DELIMITER);
        out.push_str(header);
    }
    out.push('\n');

    let relation = find_children(&sentences, &tokens);
    for (s, children) in relation.children.iter().enumerate() {
        if s > 0 {
            out.push('\n');
        }
        for &t in children {
            let token = &tokens[t];
            let word: String = chars
                [token.start() as usize..(token.end() as usize).min(chars.len())]
                .iter()
                .collect();
            out.push_str(&word);
            for (_, values) in &columns {
                out.push(DELIMITER);
                if let Some(Some(value)) = values.get(t) {
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
    }

    ctx.write_export("out", out.as_bytes())?;
    debug!(file = ctx.file_name()?, tokens = tokens.len(), "wrote CSV export");
    Ok(())
}
