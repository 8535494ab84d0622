// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, RoomSection, SupervisorSettings, UnitConfig};
use crate::config::room::ROOM_UNIT_NAMES;
use crate::errors::{Result, RoomBootError};

static UNIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid unit name regex"));

/// X display identifiers: `:10`, `:0.1`, `host:2`.
static DISPLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]*:\d+(\.\d+)?$").expect("valid display regex"));

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RoomBootError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let supervisor = validate_supervisor(&raw)?;
        ensure_has_units(&raw)?;
        if let Some(room) = &raw.room {
            validate_room(room)?;
        }
        validate_units(&raw)?;
        Ok(ConfigFile::new_unchecked(supervisor, raw.room, raw.units))
    }
}

fn config_error(msg: impl Into<String>) -> RoomBootError {
    RoomBootError::ConfigError(msg.into())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| config_error(format!("{field}: {e}")))
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<SupervisorSettings> {
    let grace_period = duration_field("[supervisor].grace_period", &cfg.supervisor.grace_period)?;
    let kill_grace_period = duration_field(
        "[supervisor].kill_grace_period",
        &cfg.supervisor.kill_grace_period,
    )?;

    if grace_period.is_zero() {
        return Err(config_error("[supervisor].grace_period must be > 0"));
    }
    if kill_grace_period.is_zero() {
        return Err(config_error("[supervisor].kill_grace_period must be > 0"));
    }

    Ok(SupervisorSettings {
        grace_period,
        kill_grace_period,
        output: cfg.supervisor.output,
    })
}

fn ensure_has_units(cfg: &RawConfigFile) -> Result<()> {
    if cfg.room.is_none() && cfg.units.is_empty() {
        return Err(config_error(
            "config must contain a [room] section or at least one [[unit]]",
        ));
    }
    Ok(())
}

fn validate_room(room: &RoomSection) -> Result<()> {
    if !DISPLAY.is_match(room.display.trim()) {
        return Err(config_error(format!(
            "[room].display must look like \":10\" (got {:?})",
            room.display
        )));
    }

    duration_field("[room].display_ready_delay", &room.display_ready_delay)?;

    let required = [
        ("rtc_address", &room.rtc_address),
        ("kbm_address", &room.kbm_address),
        ("secret_file", &room.secret_file),
        ("x_server", &room.x_server),
        ("browser", &room.browser),
        ("streamer", &room.streamer),
        ("relay", &room.relay),
        ("app", &room.app),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(config_error(format!("[room].{field} must not be empty")));
        }
    }
    if room.sandbox && room.sandbox_launcher.trim().is_empty() {
        return Err(config_error(
            "[room].sandbox_launcher must not be empty when sandbox = true",
        ));
    }

    Ok(())
}

fn validate_units(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    if cfg.room.is_some() {
        seen.extend(ROOM_UNIT_NAMES);
    }

    for unit in &cfg.units {
        validate_unit(unit)?;
        if !seen.insert(unit.name.as_str()) {
            return Err(config_error(format!(
                "duplicate unit name '{}'",
                unit.name
            )));
        }
    }
    Ok(())
}

fn validate_unit(unit: &UnitConfig) -> Result<()> {
    if !UNIT_NAME.is_match(&unit.name) {
        return Err(config_error(format!(
            "invalid unit name {:?}: use letters, digits, '_', '.' or '-'",
            unit.name
        )));
    }
    if unit.executable.trim().is_empty() {
        return Err(config_error(format!(
            "unit '{}' has an empty executable",
            unit.name
        )));
    }
    if let Some(delay) = &unit.start_delay {
        duration_field(&format!("unit '{}': start_delay", unit.name), delay)?;
    }
    Ok(())
}
