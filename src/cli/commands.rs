//! Subcommand implementations.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command as ProcessCommand;

use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::base::{Result, SparvError};
use crate::config::{CorpusConfig, PresetLibrary, schema_json, validate};
use crate::graph::build_graph;
use crate::modules::register_builtin;
use crate::preloader::{PreloadConfig, PreloadServer};
use crate::project::{SourceFiles, SparvPaths};
use crate::registry::{ExecutionEnv, FunctionKind, Registry};
use crate::resolver::{RuleSet, build_rules, resolve_classes};
use crate::scheduler::{RunOptions, RunSummary, execute};
use crate::storage::Compression;

use super::RunFlags;

/// Everything needed to build and run a graph.
pub struct Pipeline {
    pub registry: Registry,
    pub env: ExecutionEnv,
    pub ruleset: RuleSet,
}

/// Load the registry, configuration and rule set for a corpus.
pub fn load_pipeline(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    file_filter: &[String],
) -> Result<Pipeline> {
    let paths = SparvPaths::new(corpus_dir, data_dir)?;
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;

    let presets = PresetLibrary::load(&paths.presets_dir())?;
    let mut config = CorpusConfig::load(&paths, &presets)?;
    config.apply_inheritance(&registry.inheritable_option_keys());
    validate(
        config.tree(),
        &registry.all_options(),
        &registry.module_set(),
    )?;

    let sources = SourceFiles::discover(&paths.source_dir(config.source_dir_name()))?;
    let files = sources.filtered(file_filter)?;

    let compression = match config.tree().get_str("sparv.compression") {
        Some(value) => Compression::from_config(value)?,
        None => Compression::default(),
    };

    let language = SmolStr::new(config.language());
    let corpus_id = SmolStr::new(config.corpus_id());
    let bindings = resolve_classes(&registry, &config.class_bindings(), &language)?;

    let env = ExecutionEnv {
        config: config.tree().clone(),
        paths,
        compression,
        language,
        corpus_id,
        sources,
        files,
    };
    let ruleset = build_rules(&registry, bindings, &env)?;

    Ok(Pipeline {
        registry,
        env,
        ruleset,
    })
}

fn run_options(flags: &RunFlags, env: &ExecutionEnv) -> RunOptions {
    let socket = flags.socket.clone().or_else(|| {
        env.config
            .get_str("preload.socket")
            .map(PathBuf::from)
    });
    RunOptions {
        jobs: flags.jobs.unwrap_or(0),
        dry_run: flags.dry_run,
        force: flags.force,
        keep_going: flags.keep_going,
        rerun_incomplete: flags.rerun_incomplete,
        stats: flags.stats,
        socket,
        force_preloader: flags.force_preloader,
    }
}

/// Cancellation token wired to SIGINT.
fn cancellation_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("interrupt: finishing running tasks, starting no new ones");
        handler_token.cancel();
    }) {
        warn!("could not install the interrupt handler: {e}");
    }
    token
}

fn run_targets(
    pipeline: &mut Pipeline,
    targets: &[String],
    kinds: &[FunctionKind],
    flags: &RunFlags,
) -> Result<RunSummary> {
    reorder_cuda_devices();
    let graph = build_graph(&mut pipeline.ruleset, targets, kinds, &pipeline.env)?;
    let options = run_options(flags, &pipeline.env);
    let cancel = cancellation_token();
    let summary = execute(&graph, &pipeline.env, &options, &cancel)?;
    report(&summary, &options);
    Ok(summary)
}

fn report(summary: &RunSummary, options: &RunOptions) {
    if options.dry_run {
        if summary.stale.is_empty() {
            println!("Nothing to do: everything is up to date.");
        } else {
            println!("Stale tasks ({}):", summary.stale.len());
            for task in &summary.stale {
                println!("  {task}");
            }
        }
        return;
    }
    println!(
        "Done: {} executed, {} up to date, {} failed.",
        summary.executed.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    for (task, message) in &summary.failed {
        eprintln!("FAILED {task}: {message}");
    }
    if options.stats && !summary.timings.is_empty() {
        let mut timings = summary.timings.clone();
        timings.sort_by(|a, b| b.1.cmp(&a.1));
        println!("Task timings:");
        for (task, duration) in &timings {
            println!("  {duration:>10.2?}  {task}");
        }
    }
}

/// Default run targets: `export.default` from the config, else the XML
/// export.
fn default_targets(env: &ExecutionEnv) -> Vec<String> {
    env.config
        .get_string_list("export.default")
        .unwrap_or_else(|| vec!["xml_export".to_owned()])
}

// ----------------------------------------------------------------------
// Subcommands
// ----------------------------------------------------------------------

pub fn run(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    targets: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let targets = if targets.is_empty() {
        default_targets(&pipeline.env)
    } else {
        targets.to_vec()
    };
    run_targets(&mut pipeline, &targets, &[FunctionKind::Exporter], flags)
}

pub fn install(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    targets: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let targets = resolve_kind_targets(&pipeline, targets, FunctionKind::Installer)?;
    run_targets(&mut pipeline, &targets, &[FunctionKind::Installer], flags)
}

pub fn uninstall(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    targets: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let targets = resolve_kind_targets(&pipeline, targets, FunctionKind::Uninstaller)?;
    run_targets(&mut pipeline, &targets, &[FunctionKind::Uninstaller], flags)
}

pub fn build_models(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    targets: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let targets = resolve_kind_targets(&pipeline, targets, FunctionKind::ModelBuilder)?;
    run_targets(&mut pipeline, &targets, &[FunctionKind::ModelBuilder], flags)
}

/// Explicit targets, or every rule of the given kind.
fn resolve_kind_targets(
    pipeline: &Pipeline,
    targets: &[String],
    kind: FunctionKind,
) -> Result<Vec<String>> {
    if !targets.is_empty() {
        return Ok(targets.to_vec());
    }
    let all: Vec<String> = pipeline
        .ruleset
        .rules()
        .iter()
        .filter(|r| r.function.kind == kind)
        .map(|r| r.name.to_string())
        .collect();
    if all.is_empty() {
        return Err(SparvError::UnknownTarget(format!(
            "no registered {kind} for this corpus"
        )));
    }
    Ok(all)
}

pub fn run_rule(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    rules: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let kinds = all_kinds();
    run_targets(&mut pipeline, rules, &kinds, flags)
}

pub fn create_file(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    annotations: &[String],
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let kinds = all_kinds();
    run_targets(&mut pipeline, annotations, &kinds, flags)
}

pub fn run_module(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    module: &str,
    flags: &RunFlags,
) -> Result<RunSummary> {
    let mut pipeline = load_pipeline(corpus_dir, data_dir, &flags.file)?;
    let kinds = all_kinds();
    run_targets(&mut pipeline, &[module.to_owned()], &kinds, flags)
}

fn all_kinds() -> Vec<FunctionKind> {
    vec![
        FunctionKind::Importer,
        FunctionKind::Annotator,
        FunctionKind::Exporter,
        FunctionKind::Installer,
        FunctionKind::Uninstaller,
        FunctionKind::ModelBuilder,
        FunctionKind::CustomAnnotator,
    ]
}

pub fn clean(corpus_dir: &std::path::Path, export: bool, logs: bool) -> Result<()> {
    let paths = SparvPaths::without_data_dir(corpus_dir);
    for (remove, dir) in [
        (true, paths.work_dir()),
        (export, paths.export_dir()),
        (logs, paths.log_dir()),
    ] {
        if remove && dir.is_dir() {
            fs::remove_dir_all(&dir)?;
            println!("Removed {}", dir.display());
        }
    }
    Ok(())
}

pub fn setup(data_dir: Option<PathBuf>) -> Result<()> {
    let Some(dir) = data_dir else {
        return Err(SparvError::missing(
            "data directory",
            "pass --dir PATH to choose where sparv keeps its data",
        ));
    };
    for sub in ["config/presets", "bin", "models"] {
        fs::create_dir_all(dir.join(sub))?;
    }
    let defaults = dir.join("config").join("config_default.yaml");
    if !defaults.is_file() {
        fs::write(&defaults, DEFAULT_CONFIG)?;
    }
    SparvPaths::store_data_dir(&dir)?;
    println!("Data directory set to {}", dir.display());
    Ok(())
}

const DEFAULT_CONFIG: &str = "\
# Built-in defaults, merged below every corpus configuration.
import:
  source_dir: source
sparv:
  compression: gzip
";

pub fn show_config(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    path: Option<&str>,
) -> Result<()> {
    let pipeline = load_pipeline(corpus_dir, data_dir, &[])?;
    let value = match path {
        Some(path) => pipeline
            .env
            .config
            .get(path)
            .cloned()
            .ok_or_else(|| SparvError::config(path, "no such key"))?,
        None => pipeline.env.config.as_value(),
    };
    print!("{}", serde_yaml::to_string(&value)?);
    Ok(())
}

pub fn files(corpus_dir: &std::path::Path, data_dir: Option<PathBuf>) -> Result<()> {
    let pipeline = load_pipeline(corpus_dir, data_dir, &[])?;
    for file in pipeline.env.sources.names() {
        println!("{file}.{}", pipeline.env.sources.extension());
    }
    Ok(())
}

pub fn modules() -> Result<()> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    for module in registry.modules() {
        println!("{module}");
        for function in registry.functions().filter(|f| f.module() == module) {
            println!("  {:<30} {} ({})", function.id, function.description, function.kind);
        }
    }
    Ok(())
}

pub fn presets(data_dir: Option<PathBuf>) -> Result<()> {
    let paths = SparvPaths::new(".", data_dir)?;
    let library = PresetLibrary::load(&paths.presets_dir())?;
    for name in library.names() {
        println!("{name}");
        if let Some(annotations) = library.get(name) {
            for annotation in annotations {
                println!("  {annotation}");
            }
        }
    }
    Ok(())
}

pub fn classes(corpus_dir: &std::path::Path, data_dir: Option<PathBuf>) -> Result<()> {
    let pipeline = load_pipeline(corpus_dir, data_dir, &[])?;
    let bindings = pipeline.ruleset.bindings();
    for (class, value) in bindings.iter() {
        let inferred = bindings
            .inferred()
            .iter()
            .any(|(c, _)| c == class);
        let origin = if inferred { " (inferred)" } else { "" };
        println!("<{class}> = {value}{origin}");
    }
    Ok(())
}

pub fn languages() -> Result<()> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    let languages = registry.languages();
    if languages.is_empty() {
        println!("All registered functions are language independent.");
    }
    for language in languages {
        println!("{language}");
    }
    Ok(())
}

pub fn schema() -> Result<()> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    let schema = schema_json(&registry.all_options());
    println!(
        "{}",
        serde_json::to_string_pretty(&schema)
            .map_err(|e| SparvError::registry(e.to_string()))?
    );
    Ok(())
}

pub fn preload_start(
    corpus_dir: &std::path::Path,
    data_dir: Option<PathBuf>,
    config_path: &std::path::Path,
) -> Result<()> {
    let pipeline = load_pipeline(corpus_dir, data_dir, &[])?;
    let preload_config = PreloadConfig::load(config_path)?;
    let server = PreloadServer::new(&preload_config, &pipeline.ruleset, pipeline.env)?;
    server.serve()
}

pub fn preload_stop(socket: &std::path::Path) -> Result<()> {
    PreloadServer::stop(socket)?;
    println!("Stop request sent.");
    Ok(())
}

/// Reorder `CUDA_VISIBLE_DEVICES` by free GPU memory, descending.
///
/// Best effort: without `nvidia-smi` (or without GPUs) nothing happens.
fn reorder_cuda_devices() {
    const VAR: &str = "CUDA_VISIBLE_DEVICES";
    let Ok(output) = ProcessCommand::new("nvidia-smi")
        .args([
            "--query-gpu=index,memory.free",
            "--format=csv,noheader,nounits",
        ])
        .output()
    else {
        return;
    };
    if !output.status.success() {
        return;
    }
    let mut gpus: Vec<(String, u64)> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let (index, free) = line.split_once(',')?;
            Some((index.trim().to_owned(), free.trim().parse().ok()?))
        })
        .collect();
    if gpus.is_empty() {
        return;
    }
    gpus.sort_by(|a, b| b.1.cmp(&a.1));
    let order: Vec<String> = gpus.into_iter().map(|(index, _)| index).collect();
    debug!(order = ?order, "reordered CUDA devices by free memory");
    // Subprocesses spawned by annotators inherit the reordering.
    unsafe { env::set_var(VAR, order.join(",")) };
    info!("{VAR}={}", env::var(VAR).unwrap_or_default());
}
