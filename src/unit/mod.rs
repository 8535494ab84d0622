// src/unit/mod.rs

//! Supervised units: one external program each.
//!
//! - [`spec`] holds the immutable [`ProcessSpec`] and environment merging.
//! - [`state`] is the per-unit lifecycle state shared with the exit observer.
//! - [`backend`] abstracts how a process is actually launched, so the
//!   supervisor can run against a fake backend in tests.
//! - [`os`] is the production backend built on `tokio::process`.
//! - [`process_unit`] ties a spec, its state and a launched process together.

pub mod backend;
pub mod os;
pub mod process_unit;
pub mod spec;
pub mod state;

pub use backend::{ExitFuture, LaunchRequest, LaunchedProcess, ProcessBackend};
pub use os::OsBackend;
pub use process_unit::{ExitCallback, ProcessUnit, UnitExit};
pub use spec::{merge_environment, ProcessSpec};
pub use state::UnitState;
