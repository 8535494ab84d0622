// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{default_config_path, parse_duration};

/// Command-line arguments for `roomboot`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "roomboot",
    version,
    about = "Start, wire and tear down every process of a streaming room.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Roomboot.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ROOMBOOT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved units, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[supervisor].grace_period` (e.g. "5s", "500ms").
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Override `[supervisor].kill_grace_period`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub kill_grace_period: Option<Duration>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
