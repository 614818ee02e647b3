//! The `sparv` binary: parse arguments, set up logging, dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use sparv::SparvError;
use sparv::cli::{Cli, Command, PreloadAction, commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let corpus_dir = PathBuf::from(".");

    if let Err(e) = init_logging(&cli, &corpus_dir) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    let debug_logging = cli.log.eq_ignore_ascii_case("debug") || cli.log.eq_ignore_ascii_case("trace");
    match dispatch(cli, &corpus_dir) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if e.is_user_error() || !debug_logging {
                eprintln!("error: {e}");
            } else {
                // Unexpected crash with debug logging: include the chain.
                eprintln!("error: {e:?}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded (failed tasks flip it to false).
fn dispatch(cli: Cli, corpus_dir: &Path) -> Result<bool, SparvError> {
    let dir = cli.dir.clone();
    match &cli.command {
        Command::Run { targets, flags } => {
            Ok(commands::run(corpus_dir, dir, targets, flags)?.ok())
        }
        Command::Install { targets, flags } => {
            Ok(commands::install(corpus_dir, dir, targets, flags)?.ok())
        }
        Command::Uninstall { targets, flags } => {
            Ok(commands::uninstall(corpus_dir, dir, targets, flags)?.ok())
        }
        Command::BuildModels { targets, flags } => {
            Ok(commands::build_models(corpus_dir, dir, targets, flags)?.ok())
        }
        Command::RunRule { rules, flags } => {
            Ok(commands::run_rule(corpus_dir, dir, rules, flags)?.ok())
        }
        Command::CreateFile { annotations, flags } => {
            Ok(commands::create_file(corpus_dir, dir, annotations, flags)?.ok())
        }
        Command::RunModule { module, flags } => {
            Ok(commands::run_module(corpus_dir, dir, module, flags)?.ok())
        }
        Command::Clean { export, logs } => {
            commands::clean(corpus_dir, *export, *logs)?;
            Ok(true)
        }
        Command::Setup => {
            commands::setup(dir)?;
            Ok(true)
        }
        Command::Config { path } => {
            commands::show_config(corpus_dir, dir, path.as_deref())?;
            Ok(true)
        }
        Command::Files => {
            commands::files(corpus_dir, dir)?;
            Ok(true)
        }
        Command::Modules => {
            commands::modules()?;
            Ok(true)
        }
        Command::Presets => {
            commands::presets(dir)?;
            Ok(true)
        }
        Command::Classes => {
            commands::classes(corpus_dir, dir)?;
            Ok(true)
        }
        Command::Languages => {
            commands::languages()?;
            Ok(true)
        }
        Command::Schema => {
            commands::schema()?;
            Ok(true)
        }
        Command::Preload { action } => {
            match action {
                PreloadAction::Start { config } => {
                    commands::preload_start(corpus_dir, dir, config)?;
                }
                PreloadAction::Stop { socket } => {
                    commands::preload_stop(socket)?;
                }
            }
            Ok(true)
        }
    }
}

fn init_logging(cli: &Cli, corpus_dir: &Path) -> Result<(), SparvError> {
    let terminal_filter = EnvFilter::try_new(format!("sparv={}", cli.log))
        .map_err(|e| SparvError::config("--log", e.to_string()))?;

    let registry = tracing_subscriber::registry();

    fn file_layer_filter(
        cli: &Cli,
        corpus_dir: &Path,
    ) -> Result<Option<EnvFilter>, SparvError> {
        match &cli.log_to_file {
            Some(level) => {
                let log_dir = corpus_dir.join("logs");
                std::fs::create_dir_all(&log_dir)?;
                let filter = EnvFilter::try_new(format!("sparv={level}"))
                    .map_err(|e| SparvError::config("--log-to-file", e.to_string()))?;
                Ok(Some(filter))
            }
            None => Ok(None),
        }
    }

    fn open_log_file(corpus_dir: &Path) -> std::io::Result<std::sync::Arc<std::fs::File>> {
        let log_dir = corpus_dir.join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("sparv.log"))?;
        Ok(std::sync::Arc::new(file))
    }

    if cli.json_log {
        let file_layer = match file_layer_filter(cli, corpus_dir)? {
            Some(filter) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(open_log_file(corpus_dir)?)
                    .with_ansi(false)
                    .with_filter(filter),
            ),
            None => None,
        };
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(terminal_filter),
            )
            .with(file_layer)
            .init();
    } else {
        let file_layer = match file_layer_filter(cli, corpus_dir)? {
            Some(filter) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(open_log_file(corpus_dir)?)
                    .with_ansi(false)
                    .with_filter(filter),
            ),
            None => None,
        };
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(terminal_filter),
            )
            .with(file_layer)
            .init();
    }
    Ok(())
}
