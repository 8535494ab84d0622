use std::fmt;

use serde::Deserialize;

/// Signal sent to a unit when the group shuts down.
///
/// - `Terminate`: SIGTERM, the graceful default.
/// - `Interrupt`: SIGINT, for programs that only clean up on Ctrl-C.
/// - `Kill`: forceful kill, for units known to ignore graceful signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    Terminate,
    Interrupt,
    Kill,
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::Terminate
    }
}

impl StopSignal {
    /// Numeric signal value as used in `128 + n` exit codes.
    pub fn number(self) -> i32 {
        match self {
            StopSignal::Interrupt => 2,
            StopSignal::Kill => 9,
            StopSignal::Terminate => 15,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopSignal::Terminate => "SIGTERM",
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Kill => "SIGKILL",
        };
        f.write_str(name)
    }
}

/// OS signal delivered to the supervisor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Interrupt => f.write_str("SIGINT"),
            ControlSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// What happens to a child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Child shares the supervisor's stdin/stdout/stderr.
    Inherit,
    /// Child stdout/stderr are piped and re-emitted as log lines.
    Log,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Inherit
    }
}
