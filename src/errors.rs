// src/errors.rs

//! Crate-wide error types.
//!
//! - [`RoomBootError`] covers everything that can go wrong before the
//!   supervisor takes over (config, IO, TOML).
//! - [`LaunchError`] is raised by `ProcessUnit::start` when the OS refuses to
//!   spawn a unit. The supervisor turns it into a group shutdown.
//! - [`WaitTimeout`] is returned by `ProcessUnit::wait` when a unit did not
//!   reach a terminal state in time. It never changes the unit's state.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoomBootError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The OS rejected spawning a unit (missing executable, permission denied).
#[derive(Error, Debug)]
#[error("failed to launch unit '{unit}' ({program}): {source}")]
pub struct LaunchError {
    pub unit: String,
    pub program: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A unit did not confirm termination within the given period.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unit '{unit}' did not exit within {waited:?}")]
pub struct WaitTimeout {
    pub unit: String,
    pub waited: Duration,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RoomBootError>;
