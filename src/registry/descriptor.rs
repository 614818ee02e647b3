//! Typed input/output descriptors.
//!
//! A function's signature is a list of named parameters, each described by
//! one descriptor variant. Consumers match on the variant; the annotation
//! templates may contain `<class>` references and `{wildcard}` placeholders
//! resolved at rule-materialization time.

use smol_str::SmolStr;

/// One named parameter of a function signature.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: SmolStr,
    pub descriptor: Descriptor,
}

/// The kinds of values a function can declare in its signature.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// An existing span or attribute of the current file.
    Annotation { template: String },

    /// An existing annotation, read for every source file.
    AnnotationAllFiles { template: String },

    /// A span or attribute this function produces.
    Output {
        template: String,
        /// Class this output is tagged with (used for class inference).
        class: Option<String>,
        description: Option<String>,
        /// Attribute values may contain (escaped) newlines.
        allow_newlines: bool,
    },

    /// Arbitrary per-file or corpus-level data, produced or consumed.
    Data {
        name: String,
        corpus_level: bool,
        output: bool,
    },

    /// A "this ran" sentinel; always corpus-level.
    Marker { name: String, output: bool },

    /// A file under the model store.
    Model { path: String },

    /// A model file this function produces.
    ModelOutput { path: String },

    /// An executable located on the host.
    Binary { name: String },

    /// A directory containing executables.
    BinaryDir { name: String },

    /// A configuration value, read by dotted path.
    Config { key: String },

    /// The corpus language.
    Language,

    /// The corpus identifier.
    Corpus,

    /// The name of the current source file.
    SourceFilename,

    /// The names of every source file.
    AllSourceFilenames,

    /// The corpus text of the current file.
    Text,

    /// The path of the raw source file.
    Source,

    /// The resolved export annotation list (read from a config key).
    ExportAnnotations { config_key: String },

    /// The resolved source annotation list.
    SourceAnnotations { config_key: String },

    /// The resolved header annotation list.
    HeaderAnnotations { config_key: String },

    /// Declares a free variable usable in this function's templates.
    Wildcard { name: String },

    /// A final output path template under `export/<module>/`.
    Export { template: String },

    /// Another exporter's final output, consumed as input.
    ExportInput { template: String },
}

impl Descriptor {
    /// True when the descriptor names something this function produces.
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            Self::Output { .. }
                | Self::Data { output: true, .. }
                | Self::Marker { output: true, .. }
                | Self::ModelOutput { .. }
                | Self::Export { .. }
        )
    }

    /// The annotation template, for descriptor kinds that carry one.
    pub fn annotation_template(&self) -> Option<&str> {
        match self {
            Self::Annotation { template }
            | Self::AnnotationAllFiles { template }
            | Self::Output { template, .. } => Some(template),
            _ => None,
        }
    }
}
