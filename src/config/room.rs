// src/config/room.rs

//! Expansion of `[room]` into the standard unit list.
//!
//! Order matters and mirrors the dependency direction:
//!
//! 1. `display`  - X server; everything below draws on or reads from it.
//! 2. `browser`  - chromium, optionally inside firejail, on the display.
//! 3. `streamer` - captures the display and audio.
//! 4. `relay`    - injects keyboard/mouse input into the display.
//! 5. `app`      - signaling/application server handing the streams to peers.
//!
//! Shutdown walks the same list backwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, RoomBootError};
use crate::types::StopSignal;
use crate::unit::ProcessSpec;

use super::duration::parse_duration;
use super::model::RoomSection;

pub const ROOM_UNIT_NAMES: [&str; 5] = ["display", "browser", "streamer", "relay", "app"];

const BROWSER_DNS: [&str; 2] = ["1.1.1.1", "8.8.4.4"];

pub fn room_specs(room: &RoomSection, base_dir: &Path) -> Result<Vec<ProcessSpec>> {
    let display_delay = parse_duration(&room.display_ready_delay).map_err(|e| {
        RoomBootError::ConfigError(format!("[room].display_ready_delay: {e}"))
    })?;

    // The relay and app run from their own directories, so the secret path
    // must not stay relative.
    let secret_file = base_dir.join(&room.secret_file);
    let secret = secret_file.display().to_string();

    let on_display = || env(&[("DISPLAY", room.display.as_str())]);

    let display = ProcessSpec {
        name: ROOM_UNIT_NAMES[0].to_string(),
        working_directory: base_dir.to_path_buf(),
        executable: PathBuf::from(&room.x_server),
        args: vec![
            "-config".to_string(),
            room.x_config.clone(),
            room.display.clone(),
        ],
        env: BTreeMap::new(),
        start_delay: display_delay,
        stop_signal: StopSignal::Terminate,
    };

    let browser = if room.sandbox {
        let mut args = vec![format!("--profile={}", room.jail_profile), "--private".to_string()];
        args.extend(BROWSER_DNS.iter().map(|dns| format!("--dns={dns}")));
        args.push(room.browser.clone());
        args.push("--no-remote".to_string());
        unit(ROOM_UNIT_NAMES[1], base_dir.to_path_buf(), &room.sandbox_launcher, args, on_display())
    } else {
        unit(
            ROOM_UNIT_NAMES[1],
            base_dir.to_path_buf(),
            &room.browser,
            vec!["--no-remote".to_string()],
            on_display(),
        )
    };

    let streamer = unit(
        ROOM_UNIT_NAMES[2],
        base_dir.to_path_buf(),
        &room.streamer,
        Vec::new(),
        on_display(),
    );

    let mut relay = unit(
        ROOM_UNIT_NAMES[3],
        base_dir.join(&room.relay_directory),
        &room.relay,
        vec![room.kbm_address.clone(), secret.clone()],
        on_display(),
    );
    // The relay does not react to SIGTERM.
    relay.stop_signal = StopSignal::Kill;

    let mut app_args: Vec<String> = room.public_ips.iter().map(|ip| format!("--ip={ip}")).collect();
    app_args.push(format!("--secret={secret}"));
    let app = unit(
        ROOM_UNIT_NAMES[4],
        base_dir.join(&room.app_directory),
        &room.app,
        app_args,
        env(&[("SIGNAL_ADDRESS", room.rtc_address.as_str())]),
    );

    Ok(vec![display, browser, streamer, relay, app])
}

fn unit(
    name: &str,
    working_directory: PathBuf,
    executable: &str,
    args: Vec<String>,
    env: BTreeMap<String, String>,
) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        working_directory,
        executable: PathBuf::from(executable),
        args,
        env,
        start_delay: Duration::ZERO,
        stop_signal: StopSignal::Terminate,
    }
}

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
