// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod supervisor;
pub mod types;
pub mod unit;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::supervisor::{Supervisor, EXIT_CLEAN};
use crate::unit::{OsBackend, ProcessSpec};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and unit resolution
/// - the supervisor with the OS process backend
/// - SIGINT/SIGTERM handling
///
/// Returns the exit code the process should end with.
pub async fn run(args: CliArgs) -> Result<u8> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let base_dir = config_root_dir(&config_path);
    let specs = cfg.process_specs(&base_dir)?;

    let mut options = cfg.supervisor_options();
    if let Some(grace) = args.grace_period {
        options.grace_period = grace;
    }
    if let Some(grace) = args.kill_grace_period {
        options.kill_grace_period = grace;
    }

    if args.dry_run {
        print_dry_run(&base_dir, &options, &specs);
        return Ok(EXIT_CLEAN);
    }

    let supervisor = Supervisor::new(OsBackend::new(cfg.supervisor.output), options);
    let _signals = supervisor
        .listen_for_signals()
        .context("installing signal handlers")?;

    info!(config = %config_path.display(), units = specs.len(), "roomboot starting");
    let report = supervisor.run(specs).await;

    info!(reason = %report.reason, exit_code = report.exit_code(), "roomboot finished");
    Ok(report.exit_code())
}

/// Directory relative paths in the config resolve against.
///
/// - If the config path has a non-empty parent (e.g. "rooms/Roomboot.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Roomboot.toml" (parent = ""),
///   we fall back to the current working directory.
///
/// The result is made absolute so children launched elsewhere still see the
/// same paths.
fn config_root_dir(config_path: &Path) -> PathBuf {
    let dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::path::absolute(&dir).unwrap_or(dir)
}

/// Simple dry-run output: print the resolved units in startup order.
fn print_dry_run(
    base_dir: &Path,
    options: &crate::supervisor::SupervisorOptions,
    specs: &[ProcessSpec],
) {
    println!("roomboot dry-run");
    println!("  base directory = {}", base_dir.display());
    println!("  grace_period = {:?}", options.grace_period);
    println!("  kill_grace_period = {:?}", options.kill_grace_period);
    println!();

    println!("units ({}), in startup order:", specs.len());
    for spec in specs {
        println!("  - {}", spec.name);
        println!("      program: {}", spec.resolve_program().display());
        if !spec.args.is_empty() {
            println!("      args: {:?}", spec.args);
        }
        println!("      cwd: {}", spec.working_directory.display());
        for (key, value) in &spec.env {
            println!("      env: {key}={value}");
        }
        if !spec.start_delay.is_zero() {
            println!("      start_delay: {:?}", spec.start_delay);
        }
        println!("      stop_signal: {}", spec.stop_signal);
    }

    debug!("dry-run complete (nothing started)");
}
