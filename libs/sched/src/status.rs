//! Job termination statuses and the program-wide exit code.

use std::fmt;

/// Normalized code for a job that could not be started.
pub const LAUNCH_FAILED: i32 = 127;

/// Normalized code for a job killed by a signal.
pub const SIGNALED: i32 = 128;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited normally with this code.
    Exited(i32),
    /// Killed by this signal number.
    Signaled(i32),
    /// Never started.
    LaunchFailed,
}

impl Termination {
    /// Map the outcome to a non-negative code suitable for OR-folding.
    pub fn normalized_code(self) -> i32 {
        match self {
            Termination::Exited(code) => code,
            Termination::Signaled(_) => SIGNALED,
            Termination::LaunchFailed => LAUNCH_FAILED,
        }
    }

    pub fn is_success(self) -> bool {
        self.normalized_code() == 0
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with {}", code),
            Termination::Signaled(sig) => write!(f, "killed by signal {}", sig),
            Termination::LaunchFailed => f.write_str("failed to launch"),
        }
    }
}

/// A terminated child collected by a reap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: u32,
    pub termination: Termination,
}

/// Fold one normalized code into the accumulated exit code.
pub fn accumulate(current: i32, code: i32) -> i32 {
    current | code
}

/// Running bitwise-OR of every job's normalized code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitAccumulator {
    code: i32,
}

impl ExitAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, termination: Termination) {
        self.code = accumulate(self.code, termination.normalized_code());
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
