//! Layered configuration.
//!
//! A corpus configuration is a YAML key/value tree merged from, in priority
//! order: the corpus config itself, its chain of parent configs, the
//! built-in defaults file under the data directory, and per-function
//! declared defaults. Preset references expand in place, and every key is
//! validated against the schema declared by the registered functions.

mod corpus;
mod presets;
mod schema;
mod tree;

pub use corpus::{CONFIG_FILE, CorpusConfig};
pub use presets::{PresetLibrary, is_preset_reference};
pub use schema::{ConfigOption, Datatype, core_options, schema_json, validate};
pub use tree::ConfigTree;
