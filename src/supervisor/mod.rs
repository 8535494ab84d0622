// src/supervisor/mod.rs

//! Group supervision for an ordered list of units.
//!
//! - [`core`] is the pure phase machine: which event starts a shutdown, what
//!   the final exit code is. No Tokio, no processes.
//! - [`runtime`] is the async shell: staged startup, event loop, shutdown
//!   protocol with grace periods and escalation.
//! - [`signals`] turns SIGINT/SIGTERM into supervisor events.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::types::ControlSignal;
use crate::unit::{UnitExit, UnitState};

pub mod core;
pub mod runtime;
pub mod signals;

pub use self::core::SupervisorCore;
pub use self::runtime::Supervisor;
pub use signals::spawn_signal_listener;

/// Supervisor lifecycle. No phase is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// What triggered the group shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT/SIGTERM delivered to the supervisor.
    Signal(ControlSignal),
    /// Programmatic request through a [`ShutdownHandle`].
    Requested,
    /// A unit exited without being asked to.
    UnexpectedExit { unit: String, code: i32 },
    /// The OS refused to spawn a unit during startup.
    LaunchFailed { unit: String, error: String },
}

/// Exit code of the supervisor process after a clean shutdown.
pub const EXIT_CLEAN: u8 = 0;
/// Exit code used for configuration and other errors before supervision.
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_LAUNCH_FAILED: u8 = 2;
pub const EXIT_UNEXPECTED_EXIT: u8 = 3;
/// A clean shutdown that left units alive after the forceful kill.
pub const EXIT_UNITS_ABANDONED: u8 = 4;

impl ShutdownReason {
    pub fn exit_code(&self) -> u8 {
        match self {
            ShutdownReason::Signal(_) | ShutdownReason::Requested => EXIT_CLEAN,
            ShutdownReason::LaunchFailed { .. } => EXIT_LAUNCH_FAILED,
            ShutdownReason::UnexpectedExit { .. } => EXIT_UNEXPECTED_EXIT,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.exit_code() == EXIT_CLEAN
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "received {signal}"),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
            ShutdownReason::UnexpectedExit { unit, code } => {
                write!(f, "unit '{unit}' exited unexpectedly with code {code}")
            }
            ShutdownReason::LaunchFailed { unit, error } => {
                write!(f, "unit '{unit}' failed to launch: {error}")
            }
        }
    }
}

/// Events consumed by the supervisor's control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Signal(ControlSignal),
    ShutdownRequested,
    UnitExited(UnitExit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// How long stopped units get to exit before they are killed.
    pub grace_period: Duration,
    /// How long killed units get before they are abandoned.
    pub kill_grace_period: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            kill_grace_period: Duration::from_secs(2),
        }
    }
}

/// Clonable handle for requesting shutdown from outside the control loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl ShutdownHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self { tx }
    }

    /// Request a clean shutdown.
    pub fn request_shutdown(&self) {
        let _ = self.tx.send(SupervisorEvent::ShutdownRequested);
    }

    /// Feed a control signal as if the OS had delivered it.
    pub fn deliver_signal(&self, signal: ControlSignal) {
        let _ = self.tx.send(SupervisorEvent::Signal(signal));
    }
}

/// Final state of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    pub state: UnitState,
}

/// Outcome of [`Supervisor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub reason: ShutdownReason,
    /// Units that were started, in startup order, with their final state.
    pub units: Vec<UnitReport>,
    /// Specs that were never started because shutdown began first.
    pub not_started: Vec<String>,
    /// Units that received their stop signal, in the order it was sent.
    pub stop_order: Vec<String>,
    /// Units that outlived the grace period and were killed.
    pub escalated: Vec<String>,
    /// Units that survived the kill grace period too.
    pub abandoned: Vec<String>,
}

impl SupervisorReport {
    /// Exit code of the control process. A trigger that is clean on its own
    /// still fails the run if any unit had to be abandoned.
    pub fn exit_code(&self) -> u8 {
        if self.reason.is_clean() && !self.abandoned.is_empty() {
            return EXIT_UNITS_ABANDONED;
        }
        self.reason.exit_code()
    }

    pub fn unit_state(&self, name: &str) -> Option<&UnitState> {
        self.units.iter().find(|u| u.name == name).map(|u| &u.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(reason: ShutdownReason, abandoned: &[&str]) -> SupervisorReport {
        SupervisorReport {
            reason,
            units: Vec::new(),
            not_started: Vec::new(),
            stop_order: Vec::new(),
            escalated: abandoned.iter().map(|s| s.to_string()).collect(),
            abandoned: abandoned.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn abandoned_units_fail_an_otherwise_clean_shutdown() {
        let signal = ShutdownReason::Signal(ControlSignal::Terminate);
        assert_eq!(report(signal.clone(), &[]).exit_code(), EXIT_CLEAN);
        assert_eq!(report(signal, &["zombie"]).exit_code(), EXIT_UNITS_ABANDONED);
        assert_eq!(
            report(ShutdownReason::Requested, &["zombie"]).exit_code(),
            EXIT_UNITS_ABANDONED
        );
    }

    #[test]
    fn failure_reasons_keep_their_own_code_when_units_are_abandoned() {
        let unexpected = ShutdownReason::UnexpectedExit {
            unit: "relay".to_string(),
            code: 1,
        };
        assert_eq!(report(unexpected, &["zombie"]).exit_code(), EXIT_UNEXPECTED_EXIT);

        let launch = ShutdownReason::LaunchFailed {
            unit: "app".to_string(),
            error: "not found".to_string(),
        };
        assert_eq!(report(launch, &["zombie"]).exit_code(), EXIT_LAUNCH_FAILED);
    }
}
