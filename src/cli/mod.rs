//! Command-line interface.
//!
//! The `sparv` binary parses these types and dispatches to
//! [`commands`]; everything substantive lives in the library so the
//! binary stays a thin shell.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sparv", version, about = "Corpus annotation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level for the terminal (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log: String,

    /// Also log to a file under logs/, at the given level
    #[arg(long = "log-to-file", global = true, value_name = "LEVEL")]
    pub log_to_file: Option<String>,

    /// Emit log records as JSON
    #[arg(long = "json-log", global = true)]
    pub json_log: bool,

    /// Data directory (overrides SPARV_DATADIR and the stored setting)
    #[arg(long, global = true, value_name = "DATADIR", env = "SPARV_DATADIR")]
    pub dir: Option<PathBuf>,
}

/// Flags shared by every executing subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct RunFlags {
    /// Restrict the run to one or more source files
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Vec<String>,

    /// Worker count; bare -j means all CPUs
    #[arg(
        short = 'j',
        long = "jobs",
        value_name = "N",
        num_args = 0..=1,
        default_missing_value = "0"
    )]
    pub jobs: Option<usize>,

    /// Compute and list the stale tasks without running anything
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Re-run the targets even when they are up to date
    #[arg(long)]
    pub force: bool,

    /// Keep running independent branches after a failure
    #[arg(long = "keep-going")]
    pub keep_going: bool,

    /// Also re-run tasks whose outputs exist without a completeness marker
    #[arg(long = "rerun-incomplete")]
    pub rerun_incomplete: bool,

    /// Record per-task wall-clock times and print a summary
    #[arg(long)]
    pub stats: bool,

    /// Preload socket to try before running annotators inline
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Wait for the preloader instead of falling back inline
    #[arg(long = "force-preloader")]
    pub force_preloader: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Annotate the corpus and produce the requested exports
    Run {
        /// Export targets (default: export.default from the config)
        targets: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Deploy exports through their installers
    Install {
        targets: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Undo installations through the paired uninstallers
    Uninstall {
        targets: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Remove the work directory (and optionally exports and logs)
    Clean {
        /// Also remove the export directory
        #[arg(long)]
        export: bool,
        /// Also remove the logs directory
        #[arg(long)]
        logs: bool,
    },

    /// Record the data directory and create its skeleton
    Setup,

    /// Build or refresh the models used by the annotators
    BuildModels {
        targets: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Print the merged corpus configuration (or one subtree)
    Config {
        /// Dotted path of a subtree to print
        path: Option<String>,
    },

    /// List the source files of the corpus
    Files,

    /// List registered modules and their functions
    Modules,

    /// List available annotation presets
    Presets,

    /// Show resolved class bindings
    Classes,

    /// List languages referenced by registered functions
    Languages,

    /// Print the configuration schema as JSON
    Schema,

    /// Run specific rules by id
    RunRule {
        rules: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Produce specific annotations (and whatever they need)
    CreateFile {
        annotations: Vec<String>,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Run every rule of one module
    RunModule {
        module: String,
        #[command(flatten)]
        flags: RunFlags,
    },

    /// Control the preload server
    Preload {
        #[command(subcommand)]
        action: PreloadAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PreloadAction {
    /// Start the server described by a YAML control file
    Start {
        /// Preload control file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
    /// Ask a running server to shut down
    Stop {
        #[arg(long, value_name = "PATH")]
        socket: PathBuf,
    },
}
