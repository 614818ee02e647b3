//! Built-in modules.
//!
//! The thin glue plugging into the engine contracts: importers for plain
//! text and XML, a sentence segmenter and tokenizer, the token-text
//! annotator, and the XML/CSV/frequency-list exporters with the XML
//! install pair. Registered explicitly at program startup; plugins add
//! their own registrations through the same call shape.

mod csv_export;
mod misc;
mod segment;
mod stats_export;
mod text_import;
mod xml_export;
mod xml_import;

use crate::base::Result;
use crate::registry::Registry;

/// Register every built-in module.
pub fn register_builtin(registry: &mut Registry) -> Result<()> {
    text_import::register(registry)?;
    xml_import::register(registry)?;
    segment::register(registry)?;
    misc::register(registry)?;
    xml_export::register(registry)?;
    csv_export::register(registry)?;
    stats_export::register(registry)?;
    Ok(())
}
