//! CK-016: CLI. Run-wide options followed by pipeline tokens.
//!
//! `clip [--config FILE] [--collection DIR]... [--dry-run] [--keep-going] [-v] <pipeline...>`
//!
//! Exit codes: 0 success, 2 entry/method not found, 3 malformed invocation,
//! 1 any failure while running.

use crate::core::config::{self, CollectionSpec, KernelConfig, CONFIG_FILE};
use crate::core::error::{KernelError, Result};
use crate::core::executor::{ExecOptions, Executor};
use crate::core::parser::parse_pipeline;
use crate::core::registry::Registry;
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "clip",
    version,
    about = "Chain operations of filesystem-backed entries with inherited parameters"
)]
pub struct Cli {
    /// Kernel config file (default: ./clip.yaml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Collection root to search; repeatable, the first is the working collection
    #[arg(long = "collection", value_name = "DIR")]
    pub collections: Vec<PathBuf>,

    /// Print the parsed pipeline as JSON without executing it
    #[arg(long)]
    pub dry_run: bool,

    /// Record failing steps and continue with the next one
    #[arg(long)]
    pub keep_going: bool,

    /// Debug-level logging (overridden by CLIP_LOG)
    #[arg(short, long)]
    pub verbose: bool,

    /// Pipeline tokens, e.g. `byname words_collection , get_path`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PIPELINE")]
    pub pipeline: Vec<String>,
}

/// Install the stderr subscriber. `CLIP_LOG` takes precedence over `verbose`.
pub fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("CLIP_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    match dispatch(&cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

/// Parse, then print or execute the pipeline.
pub fn dispatch(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| KernelError::storage(".", format!("cannot read working directory: {}", e)))?;
    let (cfg, base) = kernel_config(cli, &cwd)?;
    check_config(&cfg)?;

    let steps = parse_pipeline(&cli.pipeline)?;
    if cli.dry_run {
        println!("{}", to_pretty(&steps)?);
        return Ok(());
    }

    let registry = Registry::from_config(&cfg, &base);
    let execution = Executor::new(&registry)
        .with_options(ExecOptions {
            continue_on_error: cli.keep_going,
        })
        .run(&steps)?;

    for failure in &execution.failures {
        eprintln!(
            "warning: step {} ({}) failed: {}",
            failure.index + 1,
            failure.method,
            failure.error
        );
    }
    if !execution.result.is_null() {
        println!("{}", to_pretty(&execution.result)?);
    }
    match execution.failures.len() {
        0 => Ok(()),
        n => Err(KernelError::failed(format!("{} step(s) failed", n))),
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| KernelError::failed(format!("cannot render result: {}", e)))
}

/// The kernel config and the directory its relative paths resolve against.
fn kernel_config(cli: &Cli, cwd: &Path) -> Result<(KernelConfig, PathBuf)> {
    let (mut cfg, base) = match &cli.config {
        Some(path) => {
            let full = cwd.join(path);
            let base = full.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            (config::load_config_file(&full)?, base)
        }
        None => {
            let default = cwd.join(CONFIG_FILE);
            if default.is_file() {
                (config::load_config_file(&default)?, cwd.to_path_buf())
            } else {
                (KernelConfig::default(), cwd.to_path_buf())
            }
        }
    };

    if !cli.collections.is_empty() {
        cfg.collections = cli
            .collections
            .iter()
            .map(|dir| {
                let path = cwd.join(dir);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                CollectionSpec { name, path }
            })
            .collect();
    }
    tracing::debug!(base = %base.display(), collections = cfg.collections.len(), "kernel config");
    Ok((cfg, base))
}

fn check_config(cfg: &KernelConfig) -> Result<()> {
    let errors = config::validate_config(cfg);
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(KernelError::Malformed(format!(
        "{} config validation error(s)",
        errors.len()
    )))
}
