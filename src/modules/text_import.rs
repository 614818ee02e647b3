//! Plain-text importer.
//!
//! The whole file becomes the corpus text, wrapped in a single `text`
//! span.

use std::fs;

use crate::base::{Annotation, Result, Span};
use crate::registry::{Descriptor, FunctionDecl, Registry};

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::importer("text_import:parse", "Import plain text files")
            .param("source", Descriptor::Source)
            .body(|ctx| {
                let path = ctx.source_path()?;
                let text = fs::read_to_string(&path)?;
                ctx.write_text(&text)?;

                let root = Annotation::new("text")?;
                let char_len = text.chars().count() as u64;
                ctx.write_source_spans(&root, &[Span::new(0, char_len)?])?;
                ctx.write_structure(&[root])?;
                Ok(())
            }),
    )
}
