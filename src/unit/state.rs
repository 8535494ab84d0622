// src/unit/state.rs

use std::fmt;

/// Lifecycle of a single unit.
///
/// `Idle → Starting → Running → Stopping → Exited(code) | Failed(error)`.
/// `Exited` and `Failed` are terminal; a unit is never restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Idle,
    Starting,
    Running,
    Stopping,
    /// Process exit code, or `128 + signal` when killed by a signal.
    Exited(i32),
    Failed(String),
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Exited(_) | UnitState::Failed(_))
    }

    /// A live unit has an OS process behind it.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            UnitState::Starting | UnitState::Running | UnitState::Stopping
        )
    }

    /// Whether `stop()` would send the unit its stop signal.
    pub fn accepts_stop(&self) -> bool {
        matches!(self, UnitState::Starting | UnitState::Running)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Idle => f.write_str("idle"),
            UnitState::Starting => f.write_str("starting"),
            UnitState::Running => f.write_str("running"),
            UnitState::Stopping => f.write_str("stopping"),
            UnitState::Exited(code) => write!(f, "exited({code})"),
            UnitState::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}
