// src/unit/backend.rs

//! Pluggable process backend.
//!
//! A [`ProcessUnit`](super::ProcessUnit) never touches `tokio::process`
//! directly. It hands a [`LaunchRequest`] to a [`ProcessBackend`] and gets
//! back a [`LaunchedProcess`]:
//!
//! - `control` carries stop/kill requests to whatever owns the process;
//! - `exit` resolves exactly once, with the exit code, when the process is
//!   gone.
//!
//! Production uses [`OsBackend`](super::OsBackend). Tests can provide a
//! backend that records launches and signals and decides when "processes"
//! exit.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::types::StopSignal;

/// Everything needed to spawn one unit, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub unit: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    /// Complete environment of the child (base merged with overlay).
    pub env: BTreeMap<String, String>,
}

/// Resolves with the exit code once the process has terminated.
pub type ExitFuture = Pin<Box<dyn Future<Output = i32> + Send + 'static>>;

pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub control: mpsc::UnboundedSender<StopSignal>,
    pub exit: ExitFuture,
}

/// Trait abstracting how units are spawned.
pub trait ProcessBackend: Send + Sync {
    /// Spawn the program described by `request`.
    ///
    /// Must return promptly: an `Err` means the OS refused to start the
    /// program at all.
    fn launch(&self, request: LaunchRequest) -> std::io::Result<LaunchedProcess>;
}
