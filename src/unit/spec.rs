// src/unit/spec.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::StopSignal;

/// Static description of one external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Identifier used in logs and reports.
    pub name: String,
    /// Directory the child is launched from.
    pub working_directory: PathBuf,
    /// Absolute, working-directory-relative, or a bare name looked up in `PATH`.
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Merged on top of the supervisor's environment; overlay wins.
    pub env: BTreeMap<String, String>,
    /// How long the supervisor waits after starting this unit before the
    /// next stage.
    pub start_delay: Duration,
    pub stop_signal: StopSignal,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_directory: PathBuf::from("."),
            executable: executable.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            start_delay: Duration::ZERO,
            stop_signal: StopSignal::default(),
        }
    }

    /// Path handed to the OS when spawning.
    ///
    /// - absolute executables are used as-is;
    /// - `working_directory/executable` is used if that file exists, or if
    ///   the executable has more than one path component (`./run.sh`,
    ///   `bin/app`);
    /// - otherwise a bare name such as `X` is left for `PATH` lookup.
    pub fn resolve_program(&self) -> PathBuf {
        if self.executable.is_absolute() {
            return self.executable.clone();
        }

        let joined = self.working_directory.join(&self.executable);
        if joined.is_file() || self.executable.components().count() > 1 {
            return absolutize(&joined);
        }

        self.executable.clone()
    }

    pub fn resolved_working_directory(&self) -> PathBuf {
        absolutize(&self.working_directory)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Effective environment of a unit: every `base` entry, with `overlay`
/// entries replacing colliding keys.
pub fn merge_environment(
    base: &BTreeMap<String, String>,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = base.clone();
    env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
