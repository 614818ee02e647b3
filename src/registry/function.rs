//! Function declarations.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::base::Result;
use crate::config::ConfigOption;

use super::context::TaskContext;
use super::descriptor::{Descriptor, Param};

/// The executable body of a function.
pub type RuleBody = Arc<dyn Fn(&mut TaskContext) -> Result<()> + Send + Sync>;

/// Default ambiguity order for functions that do not set one.
pub const DEFAULT_ORDER: u16 = 100;

/// The role a registered function plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Importer,
    Annotator,
    Exporter,
    Installer,
    Uninstaller,
    ModelBuilder,
    /// User-local annotator compiled into a per-corpus extension.
    CustomAnnotator,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Importer => "importer",
            Self::Annotator => "annotator",
            Self::Exporter => "exporter",
            Self::Installer => "installer",
            Self::Uninstaller => "uninstaller",
            Self::ModelBuilder => "modelbuilder",
            Self::CustomAnnotator => "custom annotator",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warm-instance declaration for the preloader.
#[derive(Debug, Clone)]
pub struct PreloadSpec {
    /// Parameter names whose values feed the preload fingerprint.
    pub fingerprint_params: Vec<SmolStr>,
}

/// A registered pipeline unit.
///
/// Built with the chained setters and handed to [`super::Registry::register`].
#[derive(Clone)]
pub struct FunctionDecl {
    pub id: SmolStr,
    pub kind: FunctionKind,
    pub description: String,
    /// Languages this function applies to; empty means all.
    pub languages: Vec<SmolStr>,
    /// Lower order wins when two functions produce the same identifier.
    pub order: u16,
    /// Scheduling hint: higher priority tasks launch first.
    pub priority: i16,
    /// Cap on simultaneously running instances.
    pub max_concurrent: Option<usize>,
    pub params: Vec<Param>,
    pub options: Vec<ConfigOption>,
    pub preload: Option<PreloadSpec>,
    pub body: Option<RuleBody>,
}

impl fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("order", &self.order)
            .field("params", &self.params.len())
            .finish()
    }
}

impl FunctionDecl {
    fn new(id: &str, kind: FunctionKind, description: &str) -> Self {
        Self {
            id: SmolStr::new(id),
            kind,
            description: description.to_owned(),
            languages: Vec::new(),
            order: DEFAULT_ORDER,
            priority: 0,
            max_concurrent: None,
            params: Vec::new(),
            options: Vec::new(),
            preload: None,
            body: None,
        }
    }

    pub fn importer(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::Importer, description)
    }

    pub fn annotator(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::Annotator, description)
    }

    pub fn exporter(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::Exporter, description)
    }

    pub fn installer(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::Installer, description)
    }

    pub fn uninstaller(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::Uninstaller, description)
    }

    pub fn modelbuilder(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::ModelBuilder, description)
    }

    pub fn custom_annotator(id: &str, description: &str) -> Self {
        Self::new(id, FunctionKind::CustomAnnotator, description)
    }

    /// Restrict to a language whitelist.
    pub fn languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| SmolStr::new(l)).collect();
        self
    }

    pub fn order(mut self, order: u16) -> Self {
        self.order = order;
        self
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_concurrent(mut self, cap: usize) -> Self {
        self.max_concurrent = Some(cap);
        self
    }

    /// Add a named signature parameter.
    pub fn param(mut self, name: &str, descriptor: Descriptor) -> Self {
        self.params.push(Param {
            name: SmolStr::new(name),
            descriptor,
        });
        self
    }

    /// Declare a config option this function reads.
    pub fn option(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn preloadable(mut self, spec: PreloadSpec) -> Self {
        self.preload = Some(spec);
        self
    }

    /// Set the executable body.
    pub fn body(
        mut self,
        body: impl Fn(&mut TaskContext) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    /// The module namespace (text before the `:`).
    pub fn module(&self) -> &str {
        self.id.split(':').next().unwrap_or(&self.id)
    }

    /// True when this function applies to `language`.
    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }

    /// The declared wildcard names.
    pub fn wildcards(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| match &p.descriptor {
                Descriptor::Wildcard { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Output annotation templates with their class tags.
    pub fn output_templates(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params.iter().filter_map(|p| match &p.descriptor {
            Descriptor::Output {
                template, class, ..
            } => Some((template.as_str(), class.as_deref())),
            _ => None,
        })
    }
}
