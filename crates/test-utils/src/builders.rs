#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use roomboot::config::{ConfigFile, RawConfigFile, RoomSection, SupervisorSection, UnitConfig};
use roomboot::types::StopSignal;
use roomboot::unit::ProcessSpec;

/// Builder for `ProcessSpec` to simplify test setup.
pub struct ProcessSpecBuilder {
    spec: ProcessSpec,
}

impl ProcessSpecBuilder {
    pub fn new(name: &str, executable: &str) -> Self {
        Self {
            spec: ProcessSpec::new(name, executable),
        }
    }

    /// `/bin/sh -c <script>`.
    pub fn shell(name: &str, script: &str) -> Self {
        Self::new(name, "/bin/sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.spec.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.spec.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_directory = dir.into();
        self
    }

    pub fn delay_ms(mut self, millis: u64) -> Self {
        self.spec.start_delay = Duration::from_millis(millis);
        self
    }

    pub fn stop_signal(mut self, signal: StopSignal) -> Self {
        self.spec.stop_signal = signal;
        self
    }

    pub fn build(self) -> ProcessSpec {
        self.spec
    }
}

/// Builder for `ConfigFile`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                supervisor: SupervisorSection::default(),
                room: None,
                units: Vec::new(),
            },
        }
    }

    pub fn with_room(mut self, room: RoomSection) -> Self {
        self.config.room = Some(room);
        self
    }

    pub fn with_unit(mut self, unit: UnitConfig) -> Self {
        self.config.units.push(unit);
        self
    }

    pub fn grace_period(mut self, value: &str) -> Self {
        self.config.supervisor.grace_period = value.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn try_build(self) -> roomboot::errors::Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `UnitConfig`.
pub struct UnitConfigBuilder {
    unit: UnitConfig,
}

impl UnitConfigBuilder {
    pub fn new(name: &str, executable: &str) -> Self {
        Self {
            unit: UnitConfig {
                name: name.to_string(),
                working_directory: None,
                executable: executable.to_string(),
                args: vec![],
                env: BTreeMap::new(),
                start_delay: None,
                stop_signal: StopSignal::default(),
            },
        }
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.unit.working_directory = Some(dir.to_string());
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.unit.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.unit.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn start_delay(mut self, value: &str) -> Self {
        self.unit.start_delay = Some(value.to_string());
        self
    }

    pub fn stop_signal(mut self, signal: StopSignal) -> Self {
        self.unit.stop_signal = signal;
        self
    }

    pub fn build(self) -> UnitConfig {
        self.unit
    }
}
