// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, RoomBootError};
use crate::supervisor::SupervisorOptions;
use crate::types::{OutputMode, StopSignal};
use crate::unit::ProcessSpec;

use super::duration::parse_duration;
use super::room::room_specs;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// grace_period = "5s"
/// kill_grace_period = "2s"
/// output = "inherit"
///
/// [room]
/// display = ":10"
/// public_ips = ["203.0.113.30"]
///
/// [[unit]]
/// name = "metrics"
/// executable = "bin/metrics"
/// ```
///
/// `[room]` expands into the standard room units; `[[unit]]` entries are
/// started after them, in file order.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub room: Option<RoomSection>,

    #[serde(default, rename = "unit")]
    pub units: Vec<UnitConfig>,
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Time a stopped unit gets to exit before it is killed.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Time a killed unit gets before it is abandoned.
    #[serde(default = "default_kill_grace_period")]
    pub kill_grace_period: String,

    #[serde(default)]
    pub output: OutputMode,
}

fn default_grace_period() -> String {
    "5s".to_string()
}

fn default_kill_grace_period() -> String {
    "2s".to_string()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            kill_grace_period: default_kill_grace_period(),
            output: OutputMode::default(),
        }
    }
}

/// `[room]` section: the knobs of one streaming room.
///
/// Program locations default to the layout of a room checkout
/// (`stream.sh` at the root, `bin/rotcore`, `bin/kbm/release/kbm`).
#[derive(Debug, Clone, Deserialize)]
pub struct RoomSection {
    /// X display, e.g. `":10"`.
    pub display: String,

    /// Run the browser inside firejail.
    #[serde(default = "default_true")]
    pub sandbox: bool,

    /// `SIGNAL_ADDRESS` of the application server.
    #[serde(default = "default_rtc_address")]
    pub rtc_address: String,

    /// Listen address of the input relay.
    #[serde(default = "default_kbm_address")]
    pub kbm_address: String,

    /// Addresses advertised to peers (`--ip=` per entry).
    #[serde(default)]
    pub public_ips: Vec<String>,

    /// Shared secret file, passed to the relay and the application server.
    #[serde(default = "default_secret_file")]
    pub secret_file: String,

    /// Wait after starting the display server before the browser attaches.
    #[serde(default = "default_display_ready_delay")]
    pub display_ready_delay: String,

    #[serde(default = "default_x_server")]
    pub x_server: String,
    #[serde(default = "default_x_config")]
    pub x_config: String,

    #[serde(default = "default_sandbox_launcher")]
    pub sandbox_launcher: String,
    #[serde(default = "default_jail_profile")]
    pub jail_profile: String,
    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_streamer")]
    pub streamer: String,

    #[serde(default = "default_relay_directory")]
    pub relay_directory: String,
    #[serde(default = "default_relay")]
    pub relay: String,

    #[serde(default = "default_app_directory")]
    pub app_directory: String,
    #[serde(default = "default_app")]
    pub app: String,
}

fn default_true() -> bool {
    true
}
fn default_rtc_address() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_kbm_address() -> String {
    "0.0.0.0:9232".to_string()
}
fn default_secret_file() -> String {
    "secret.txt".to_string()
}
fn default_display_ready_delay() -> String {
    "2s".to_string()
}
fn default_x_server() -> String {
    "X".to_string()
}
fn default_x_config() -> String {
    "conf/10-headless.conf".to_string()
}
fn default_sandbox_launcher() -> String {
    "firejail".to_string()
}
fn default_jail_profile() -> String {
    "conf/jail.conf".to_string()
}
fn default_browser() -> String {
    "chromium".to_string()
}
fn default_streamer() -> String {
    "stream.sh".to_string()
}
fn default_relay_directory() -> String {
    "bin/kbm/release".to_string()
}
fn default_relay() -> String {
    "kbm".to_string()
}
fn default_app_directory() -> String {
    "bin".to_string()
}
fn default_app() -> String {
    "rotcore".to_string()
}

impl RoomSection {
    /// Room with every optional field at its default.
    pub fn with_display(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            sandbox: default_true(),
            rtc_address: default_rtc_address(),
            kbm_address: default_kbm_address(),
            public_ips: Vec::new(),
            secret_file: default_secret_file(),
            display_ready_delay: default_display_ready_delay(),
            x_server: default_x_server(),
            x_config: default_x_config(),
            sandbox_launcher: default_sandbox_launcher(),
            jail_profile: default_jail_profile(),
            browser: default_browser(),
            streamer: default_streamer(),
            relay_directory: default_relay_directory(),
            relay: default_relay(),
            app_directory: default_app_directory(),
            app: default_app(),
        }
    }
}

/// `[[unit]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub name: String,

    /// Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub working_directory: Option<String>,

    pub executable: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub start_delay: Option<String>,

    #[serde(default)]
    pub stop_signal: StopSignal,
}

impl UnitConfig {
    fn to_spec(&self, base_dir: &Path) -> Result<ProcessSpec> {
        let start_delay = match &self.start_delay {
            Some(s) => parse_duration(s).map_err(|e| {
                RoomBootError::ConfigError(format!("unit '{}': start_delay: {e}", self.name))
            })?,
            None => Duration::ZERO,
        };

        let working_directory = match &self.working_directory {
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        };

        Ok(ProcessSpec {
            name: self.name.clone(),
            working_directory,
            executable: PathBuf::from(&self.executable),
            args: self.args.clone(),
            env: self.env.clone(),
            start_delay,
            stop_signal: self.stop_signal,
        })
    }
}

/// Parsed `[supervisor]` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub kill_grace_period: Duration,
    pub output: OutputMode,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (see
/// `validate.rs`) or [`load_and_validate`](super::load_and_validate).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSettings,
    pub room: Option<RoomSection>,
    pub units: Vec<UnitConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        supervisor: SupervisorSettings,
        room: Option<RoomSection>,
        units: Vec<UnitConfig>,
    ) -> Self {
        Self {
            supervisor,
            room,
            units,
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            grace_period: self.supervisor.grace_period,
            kill_grace_period: self.supervisor.kill_grace_period,
        }
    }

    /// Ordered unit list: room units first, then `[[unit]]` entries.
    ///
    /// `base_dir` is the directory relative paths are resolved against,
    /// normally the directory holding the config file.
    pub fn process_specs(&self, base_dir: &Path) -> Result<Vec<ProcessSpec>> {
        let mut specs = match &self.room {
            Some(room) => room_specs(room, base_dir)?,
            None => Vec::new(),
        };

        for unit in &self.units {
            specs.push(unit.to_spec(base_dir)?);
        }

        Ok(specs)
    }
}
