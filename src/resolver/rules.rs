//! Rule materialization.
//!
//! A rule is a materialized call of one registered function: classes and
//! wildcards substituted, config values snapshotted, inputs and outputs
//! concrete. Wildcard-bearing functions stay as templates and are
//! instantiated lazily when some requested output matches one of their
//! output patterns.

use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

use crate::base::{Annotation, Result, SparvError, expand_in_list};
use crate::registry::{
    Descriptor, ExecutionEnv, FunctionDecl, FunctionKind, Registry, ResolvedParam,
};

use super::classes::ClassBindings;

/// Whether a rule runs once per source file or once per corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    File,
    Corpus,
}

/// An artifact a rule consumes or produces, identified for graph edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// A span or attribute annotation (per file).
    Annotation(Annotation),
    /// The corpus text of a file.
    Text,
    /// The source-structure record of a file.
    Structure,
    /// A data annotation.
    Data { name: SmolStr, corpus_level: bool },
    /// An install marker (corpus-level).
    Marker(SmolStr),
    /// A final export file (template form, `{file}` unexpanded).
    Export(String),
    /// A file under the model store.
    Model(std::path::PathBuf),
}

impl Artifact {
    /// Stable key used to match producers with consumers.
    pub fn key(&self) -> String {
        match self {
            Self::Annotation(a) => format!("ann:{a}"),
            Self::Text => "@text".to_owned(),
            Self::Structure => "@structure".to_owned(),
            Self::Data { name, corpus_level } => {
                if *corpus_level {
                    format!("cdata:{name}")
                } else {
                    format!("data:{name}")
                }
            }
            Self::Marker(name) => format!("marker:{name}"),
            Self::Export(template) => format!("export:{template}"),
            Self::Model(path) => format!("model:{}", path.display()),
        }
    }
}

/// An input edge: the artifact plus whether it is consumed across all
/// source files.
#[derive(Debug, Clone)]
pub struct InputRef {
    pub artifact: Artifact,
    pub all_files: bool,
}

/// A materialized call of one registered function.
#[derive(Debug)]
pub struct Rule {
    /// Unique rule instance name: the function id, plus wildcard bindings
    /// when instantiated from a template.
    pub name: SmolStr,
    pub function: Arc<FunctionDecl>,
    pub params: IndexMap<SmolStr, ResolvedParam>,
    pub scope: RuleScope,
    pub wildcard_bindings: IndexMap<SmolStr, SmolStr>,
}

impl Rule {
    pub fn order(&self) -> u16 {
        self.function.order
    }

    /// Artifacts this rule produces.
    pub fn outputs(&self) -> Vec<Artifact> {
        let mut out = Vec::new();
        if self.function.kind == FunctionKind::Importer {
            out.push(Artifact::Text);
            out.push(Artifact::Structure);
        }
        for param in self.params.values() {
            match param {
                ResolvedParam::Output { annotation, .. } => {
                    out.push(Artifact::Annotation(annotation.clone()));
                }
                ResolvedParam::Data {
                    name,
                    corpus_level,
                    output: true,
                } => out.push(Artifact::Data {
                    name: name.clone(),
                    corpus_level: *corpus_level,
                }),
                ResolvedParam::Marker { name, output: true } => {
                    out.push(Artifact::Marker(name.clone()));
                }
                ResolvedParam::ModelOutput(path) => {
                    out.push(Artifact::Model(path.clone()));
                }
                ResolvedParam::Export(template) => {
                    out.push(Artifact::Export(template.clone()));
                }
                _ => {}
            }
        }
        out
    }

    /// Artifacts this rule consumes.
    pub fn inputs(&self) -> Vec<InputRef> {
        let mut out = Vec::new();
        let mut push = |artifact: Artifact, all_files: bool| {
            out.push(InputRef {
                artifact,
                all_files,
            });
        };
        for param in self.params.values() {
            match param {
                ResolvedParam::Annotation(a) => {
                    push(Artifact::Annotation(a.clone()), false);
                }
                ResolvedParam::AnnotationAllFiles(a) => {
                    push(Artifact::Annotation(a.clone()), true);
                }
                ResolvedParam::Data {
                    name,
                    corpus_level,
                    output: false,
                } => push(
                    Artifact::Data {
                        name: name.clone(),
                        corpus_level: *corpus_level,
                    },
                    false,
                ),
                ResolvedParam::Text => push(Artifact::Text, false),
                ResolvedParam::ExportAnnotations(items) => {
                    let all_files = self.scope == RuleScope::Corpus;
                    for item in items {
                        push(Artifact::Annotation(item.annotation.clone()), all_files);
                    }
                }
                ResolvedParam::SourceAnnotations(_) | ResolvedParam::HeaderAnnotations(_) => {
                    push(Artifact::Structure, self.scope == RuleScope::Corpus);
                }
                ResolvedParam::ExportInput(template) => {
                    push(
                        Artifact::Export(template.clone()),
                        self.scope == RuleScope::Corpus,
                    );
                }
                _ => {}
            }
        }
        out
    }

    /// True when every declared binary prerequisite can be located.
    pub fn prerequisites_available(&self, env: &ExecutionEnv) -> bool {
        self.params.values().all(|param| match param {
            ResolvedParam::Binary(name) => env.paths.find_binary(name).is_ok(),
            ResolvedParam::BinaryDir(name) => env.paths.bin_dir().join(name.as_str()).is_dir(),
            _ => true,
        })
    }
}

/// All materialized rules plus dormant templates.
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
    templates: Vec<Arc<FunctionDecl>>,
    by_output: FxHashMap<String, Vec<usize>>,
    bindings: ClassBindings,
}

impl RuleSet {
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn bindings(&self) -> &ClassBindings {
        &self.bindings
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Every concrete annotation any materialized rule can produce.
    pub fn producible_annotations(&self) -> Vec<Annotation> {
        let mut out = Vec::new();
        for rule in &self.rules {
            for artifact in rule.outputs() {
                if let Artifact::Annotation(a) = artifact {
                    if !out.contains(&a) {
                        out.push(a);
                    }
                }
            }
        }
        out
    }

    /// Select the producing rule for an artifact.
    ///
    /// Among concrete candidates the lowest `order` wins; a candidate
    /// whose binary prerequisites are missing is passed over in favour of
    /// the next order. An exact tie on `order` is a hard error. When no
    /// concrete rule matches an annotation artifact, wildcard templates
    /// are tried and instantiated on demand.
    pub fn producer_of(&mut self, artifact: &Artifact, env: &ExecutionEnv) -> Result<Option<usize>> {
        let key = artifact.key();
        if !self.by_output.contains_key(&key) {
            if let Artifact::Annotation(annotation) = artifact {
                self.instantiate_templates_for(annotation, env)?;
            }
        }
        let Some(candidates) = self.by_output.get(&key) else {
            return Ok(None);
        };
        let mut sorted: Vec<usize> = candidates.clone();
        sorted.sort_by_key(|&i| self.rules[i].order());

        // Equal order on the same artifact is ambiguous.
        for pair in sorted.windows(2) {
            if self.rules[pair[0]].order() == self.rules[pair[1]].order() {
                return Err(SparvError::registry(format!(
                    "'{}' and '{}' both produce '{key}' with order {}",
                    self.rules[pair[0]].name,
                    self.rules[pair[1]].name,
                    self.rules[pair[0]].order()
                )));
            }
        }

        for &index in &sorted {
            if self.rules[index].prerequisites_available(env) {
                return Ok(Some(index));
            }
            debug!(
                rule = %self.rules[index].name,
                "skipping producer with missing prerequisites"
            );
        }
        // All candidates lack prerequisites; report the preferred one so
        // the error names a real rule.
        Ok(sorted.first().copied())
    }

    pub fn rule(&self, index: usize) -> &Arc<Rule> {
        &self.rules[index]
    }

    fn index_rule(&mut self, rule: Rule) -> usize {
        let index = self.rules.len();
        let rule = Arc::new(rule);
        for artifact in rule.outputs() {
            self.by_output.entry(artifact.key()).or_default().push(index);
        }
        self.rules.push(rule);
        index
    }

    /// Instantiate any template whose output pattern matches `wanted`.
    fn instantiate_templates_for(
        &mut self,
        wanted: &Annotation,
        env: &ExecutionEnv,
    ) -> Result<()> {
        let templates: Vec<Arc<FunctionDecl>> = self.templates.clone();
        for function in templates {
            let mut outputs: Vec<String> = Vec::new();
            for (template, _) in function.output_templates() {
                match self.bindings.resolve(&Annotation::new(template)?) {
                    Ok(resolved) => outputs.push(resolved.as_str().to_owned()),
                    Err(SparvError::UnresolvedClass(_)) => continue,
                    Err(other) => return Err(other),
                }
            }
            for output in outputs {
                let Some(bound) = unify_wildcards(&output, wanted.as_str()) else {
                    continue;
                };
                let declared = function.wildcards();
                if !declared.iter().all(|w| bound.contains_key(*w)) {
                    continue;
                }
                // Key order fixes the instance name, which doubles as the
                // marker identity across runs.
                let mut pairs: Vec<(String, String)> = bound.into_iter().collect();
                pairs.sort();
                let bindings: IndexMap<SmolStr, SmolStr> = pairs
                    .into_iter()
                    .map(|(k, v)| (SmolStr::new(k), SmolStr::new(v)))
                    .collect();
                let name = instance_name(&function.id, &bindings);
                if self.rules.iter().any(|r| r.name == name) {
                    continue;
                }
                debug!(rule = %name, "instantiated wildcard template");
                let rule =
                    materialize(&function, &self.bindings, env, Some(&bindings))?;
                self.index_rule(rule);
            }
        }
        Ok(())
    }

    /// Resolve `ExportAnnotations` parameter lists against the full set of
    /// producible annotations. Runs once after initial materialization.
    fn finalize_export_lists(&mut self, env: &ExecutionEnv) -> Result<()> {
        let candidates = self.producible_annotations();
        let mut replacements: Vec<(usize, SmolStr, ResolvedParam)> = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            for (param_name, param) in &rule.params {
                if let ResolvedParam::ExportAnnotations(_) = param {
                    let Some(raw) = raw_export_entries(rule, param_name.as_str(), env) else {
                        continue;
                    };
                    let mut resolved_entries = Vec::new();
                    for entry in raw {
                        resolved_entries.push(resolve_entry(&entry, &self.bindings)?);
                    }
                    let items = expand_in_list(&resolved_entries, &candidates)?;
                    replacements.push((
                        index,
                        param_name.clone(),
                        ResolvedParam::ExportAnnotations(items),
                    ));
                }
            }
        }
        for (index, param_name, value) in replacements {
            let rule = Arc::get_mut(&mut self.rules[index]).ok_or_else(|| {
                SparvError::registry("rule mutated after sharing".to_owned())
            })?;
            rule.params.insert(param_name, value);
        }
        Ok(())
    }
}

/// Resolve classes in a raw list entry, leaving `not`/`as`/`...` forms
/// intact around the identifier.
fn resolve_entry(entry: &str, bindings: &ClassBindings) -> Result<String> {
    use crate::base::ListItem;
    match ListItem::parse(entry) {
        ListItem::Rest => Ok("...".to_owned()),
        ListItem::Exclude(name) => {
            let resolved = bindings.resolve(&Annotation::new(&name)?)?;
            Ok(format!("not {resolved}"))
        }
        ListItem::Include { name, rename } => {
            let resolved = bindings.resolve(&Annotation::new(&name)?)?;
            match rename {
                Some(rename) => Ok(format!("{resolved} as {rename}")),
                None => Ok(resolved.as_str().to_owned()),
            }
        }
    }
}

/// The raw config entries behind an `ExportAnnotations` parameter.
fn raw_export_entries(rule: &Rule, param_name: &str, env: &ExecutionEnv) -> Option<Vec<String>> {
    let param = rule
        .function
        .params
        .iter()
        .find(|p| p.name == param_name)?;
    match &param.descriptor {
        Descriptor::ExportAnnotations { config_key } => {
            Some(env.config.get_string_list(config_key).unwrap_or_default())
        }
        _ => None,
    }
}

fn instance_name(function_id: &str, bindings: &IndexMap<SmolStr, SmolStr>) -> SmolStr {
    if bindings.is_empty() {
        return SmolStr::new(function_id);
    }
    let mut name = String::from(function_id);
    name.push('{');
    for (i, (key, value)) in bindings.iter().enumerate() {
        if i > 0 {
            name.push(',');
        }
        name.push_str(key);
        name.push('=');
        name.push_str(value);
    }
    name.push('}');
    SmolStr::new(name)
}

/// Match a concrete identifier against a wildcard pattern, returning the
/// placeholder bindings on success.
fn unify_wildcards(pattern: &str, concrete: &str) -> Option<FxHashMap<String, String>> {
    if !pattern.contains('{') {
        return if pattern == concrete {
            Some(FxHashMap::default())
        } else {
            None
        };
    }
    let mut regex_src = String::from("^");
    let mut names = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        regex_src.push_str(&regex::escape(&rest[..open]));
        let close = rest[open..].find('}')? + open;
        let name = &rest[open + 1..close];
        names.push(name.to_owned());
        regex_src.push_str(&format!("(?P<{name}>[a-z0-9_./-]+)"));
        rest = &rest[close + 1..];
    }
    regex_src.push_str(&regex::escape(rest));
    regex_src.push('$');
    let re = Regex::new(&regex_src).ok()?;
    let captures = re.captures(concrete)?;
    let mut bindings = FxHashMap::default();
    for name in names {
        let value = captures.name(&name)?.as_str().to_owned();
        match bindings.get(&name) {
            Some(existing) if existing != &value => return None,
            _ => {
                bindings.insert(name, value);
            }
        }
    }
    Some(bindings)
}

/// Materialize every language-matching, wildcard-free function; keep
/// wildcard functions as templates.
pub fn build_rules(
    registry: &Registry,
    bindings: ClassBindings,
    env: &ExecutionEnv,
) -> Result<RuleSet> {
    let configured_importer = env.config.get_str("import.importer").unwrap_or("");
    let mut set = RuleSet {
        rules: Vec::new(),
        templates: Vec::new(),
        by_output: FxHashMap::default(),
        bindings,
    };

    for function in registry.functions() {
        if !function.supports_language(&env.language) {
            continue;
        }
        // Only the configured importer takes part in the run.
        if function.kind == FunctionKind::Importer && function.id != configured_importer {
            continue;
        }
        if !function.wildcards().is_empty() {
            set.templates.push(Arc::clone(function));
            continue;
        }
        match materialize(function, &set.bindings, env, None) {
            Ok(rule) => {
                set.index_rule(rule);
            }
            // A function referencing a class nothing binds is dormant in
            // this configuration; it only errors if something needs it.
            Err(SparvError::UnresolvedClass(class)) => {
                debug!(function = %function.id, class, "function dormant: class unbound");
            }
            Err(other) => return Err(other),
        }
    }

    set.finalize_export_lists(env)?;
    Ok(set)
}

/// Resolve one function into a rule, substituting classes, wildcards and
/// config values.
fn materialize(
    function: &Arc<FunctionDecl>,
    bindings: &ClassBindings,
    env: &ExecutionEnv,
    wildcards: Option<&IndexMap<SmolStr, SmolStr>>,
) -> Result<Rule> {
    let empty = IndexMap::new();
    let wildcard_bindings = wildcards.unwrap_or(&empty);
    let mut params = IndexMap::new();
    let mut scope = match function.kind {
        FunctionKind::Importer | FunctionKind::Annotator | FunctionKind::CustomAnnotator => {
            RuleScope::File
        }
        FunctionKind::Exporter => RuleScope::File,
        FunctionKind::Installer | FunctionKind::Uninstaller | FunctionKind::ModelBuilder => {
            RuleScope::Corpus
        }
    };

    for param in &function.params {
        let resolved = match &param.descriptor {
            Descriptor::Annotation { template } => ResolvedParam::Annotation(resolve_template(
                template,
                bindings,
                wildcard_bindings,
                &function.id,
            )?),
            Descriptor::AnnotationAllFiles { template } => {
                scope = RuleScope::Corpus;
                ResolvedParam::AnnotationAllFiles(resolve_template(
                    template,
                    bindings,
                    wildcard_bindings,
                    &function.id,
                )?)
            }
            Descriptor::Output {
                template,
                allow_newlines,
                ..
            } => ResolvedParam::Output {
                annotation: resolve_template(template, bindings, wildcard_bindings, &function.id)?,
                allow_newlines: *allow_newlines,
            },
            Descriptor::Data {
                name,
                corpus_level,
                output,
            } => ResolvedParam::Data {
                name: SmolStr::new(name),
                corpus_level: *corpus_level,
                output: *output,
            },
            Descriptor::Marker { name, output } => ResolvedParam::Marker {
                name: SmolStr::new(name),
                output: *output,
            },
            Descriptor::Model { path } => {
                ResolvedParam::Model(env.paths.models_dir().join(path))
            }
            Descriptor::ModelOutput { path } => {
                ResolvedParam::ModelOutput(env.paths.models_dir().join(path))
            }
            Descriptor::Binary { name } => ResolvedParam::Binary(SmolStr::new(name)),
            Descriptor::BinaryDir { name } => ResolvedParam::BinaryDir(SmolStr::new(name)),
            Descriptor::Config { key } => {
                let value = env.config.get(key).cloned().or_else(|| {
                    function
                        .options
                        .iter()
                        .find(|o| &o.key == key)
                        .and_then(|o| o.default.clone())
                });
                ResolvedParam::Config(value.unwrap_or(serde_yaml::Value::Null))
            }
            Descriptor::Language => ResolvedParam::Language(env.language.clone()),
            Descriptor::Corpus => ResolvedParam::Corpus(env.corpus_id.clone()),
            Descriptor::SourceFilename => ResolvedParam::SourceFilename,
            Descriptor::AllSourceFilenames => {
                scope = RuleScope::Corpus;
                ResolvedParam::AllSourceFilenames(env.files.clone())
            }
            Descriptor::Text => ResolvedParam::Text,
            Descriptor::Source => ResolvedParam::Source,
            Descriptor::ExportAnnotations { .. } => {
                // Placeholder; resolved by finalize_export_lists once the
                // producible candidate set is known.
                ResolvedParam::ExportAnnotations(Vec::new())
            }
            Descriptor::SourceAnnotations { config_key } => ResolvedParam::SourceAnnotations(
                env.config.get_string_list(config_key).unwrap_or_default(),
            ),
            Descriptor::HeaderAnnotations { config_key } => ResolvedParam::HeaderAnnotations(
                env.config.get_string_list(config_key).unwrap_or_default(),
            ),
            Descriptor::Wildcard { name } => {
                let value = wildcard_bindings.get(name.as_str()).ok_or_else(|| {
                    SparvError::registry(format!(
                        "wildcard '{{{name}}}' of '{}' has no binding",
                        function.id
                    ))
                })?;
                ResolvedParam::Wildcard {
                    name: SmolStr::new(name),
                    value: value.clone(),
                }
            }
            Descriptor::Export { template } => ResolvedParam::Export(template.clone()),
            Descriptor::ExportInput { template } => ResolvedParam::ExportInput(template.clone()),
        };
        params.insert(param.name.clone(), resolved);
    }

    Ok(Rule {
        name: instance_name(&function.id, wildcard_bindings),
        function: Arc::clone(function),
        params,
        scope,
        wildcard_bindings: wildcard_bindings.clone(),
    })
}

/// Substitute classes and wildcards in an annotation template.
fn resolve_template(
    template: &str,
    bindings: &ClassBindings,
    wildcards: &IndexMap<SmolStr, SmolStr>,
    function_id: &str,
) -> Result<Annotation> {
    let annotation = Annotation::new(template)?;
    let annotation = annotation.bind_wildcards(|name| {
        wildcards.get(name).map(SmolStr::as_str)
    })?;
    let annotation = bindings.resolve(&annotation)?;
    if annotation.has_wildcards() {
        return Err(SparvError::registry(format!(
            "wildcard left unbound in '{annotation}' of '{function_id}'"
        )));
    }
    Ok(annotation)
}
