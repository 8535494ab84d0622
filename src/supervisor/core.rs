// src/supervisor/core.rs

//! Pure supervisor state machine.
//!
//! Every shutdown trigger (signal, programmatic request, unexpected unit
//! exit, launch failure) goes through [`SupervisorCore::trigger`]. Only the
//! first trigger is accepted; later ones are ignored, so a group is torn down
//! exactly once and ends with exactly one reason.

use super::{Phase, ShutdownReason, SupervisorEvent};

#[derive(Debug)]
pub struct SupervisorCore {
    phase: Phase,
    reason: Option<ShutdownReason>,
}

impl Default for SupervisorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorCore {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            reason: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn shutdown_reason(&self) -> Option<&ShutdownReason> {
        self.reason.as_ref()
    }

    /// `Idle → Starting`.
    pub fn begin_startup(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Starting;
        }
    }

    /// Whether the next unit may be started.
    pub fn accepts_starts(&self) -> bool {
        self.phase == Phase::Starting
    }

    /// `Starting → Running`, unless a shutdown already began.
    pub fn startup_complete(&mut self) {
        if self.phase == Phase::Starting {
            self.phase = Phase::Running;
        }
    }

    /// Move to `ShuttingDown` with `reason`.
    ///
    /// Returns the reason if this call started the shutdown, `None` if a
    /// shutdown was already underway or finished.
    pub fn trigger(&mut self, reason: ShutdownReason) -> Option<ShutdownReason> {
        match self.phase {
            Phase::Idle | Phase::Starting | Phase::Running => {
                self.phase = Phase::ShuttingDown;
                self.reason = Some(reason.clone());
                Some(reason)
            }
            Phase::ShuttingDown | Phase::Stopped => None,
        }
    }

    /// Map an event to a shutdown trigger.
    ///
    /// Unit exits only count while starting or running and only if the unit
    /// was not asked to stop.
    pub fn handle_event(&mut self, event: SupervisorEvent) -> Option<ShutdownReason> {
        let reason = match event {
            SupervisorEvent::Signal(signal) => ShutdownReason::Signal(signal),
            SupervisorEvent::ShutdownRequested => ShutdownReason::Requested,
            SupervisorEvent::UnitExited(exit) => {
                let active = matches!(self.phase, Phase::Starting | Phase::Running);
                if !active || exit.requested {
                    return None;
                }
                ShutdownReason::UnexpectedExit {
                    unit: exit.unit,
                    code: exit.code,
                }
            }
        };

        self.trigger(reason)
    }

    /// `ShuttingDown → Stopped`.
    pub fn finish(&mut self) {
        if self.phase == Phase::ShuttingDown {
            self.phase = Phase::Stopped;
        }
    }

    /// Exit code for the supervisor process; clean if nothing triggered.
    pub fn exit_code(&self) -> u8 {
        self.reason
            .as_ref()
            .map(ShutdownReason::exit_code)
            .unwrap_or(super::EXIT_CLEAN)
    }
}
