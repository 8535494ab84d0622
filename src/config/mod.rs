// src/config/mod.rs

//! Configuration: TOML file → validated [`ConfigFile`] → ordered
//! [`ProcessSpec`](crate::unit::ProcessSpec)s.
//!
//! The supervisor never reads configuration itself; it is handed the
//! resolved spec list produced here.

pub mod duration;
pub mod loader;
pub mod model;
pub mod room;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, PUBLIC_IPS_ENV_VAR};
pub use model::{ConfigFile, RawConfigFile, RoomSection, SupervisorSection, UnitConfig};
pub use room::{room_specs, ROOM_UNIT_NAMES};
