// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Comma-separated public addresses; replaces `[room].public_ips` when set.
pub const PUBLIC_IPS_ENV_VAR: &str = "ROOMBOOT_PUBLIC_IPS";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, apply environment overrides and
/// validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;

    if let Ok(value) = std::env::var(PUBLIC_IPS_ENV_VAR) {
        apply_public_ips_override(&mut raw_config, &value);
    }

    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Replace the room's public addresses with the comma-separated `value`.
///
/// Has no effect without a `[room]` section.
pub fn apply_public_ips_override(cfg: &mut RawConfigFile, value: &str) {
    let Some(room) = cfg.room.as_mut() else {
        return;
    };

    room.public_ips = parse_ip_list(value);
    debug!(ips = ?room.public_ips, "public addresses taken from {}", PUBLIC_IPS_ENV_VAR);
}

fn parse_ip_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default config path: `Roomboot.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Roomboot.toml")
}
