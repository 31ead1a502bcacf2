//! Names shared between the executor and the harness binary.

use std::fmt;
use std::str::FromStr;

/// Diagnostic written to the error stream when the entry point cannot be run.
pub const NO_ENTRY_POINT_MESSAGE: &str = "No main method found in project.";

/// Values of [`ExceptionDescriptor::kind`](crate::ExceptionDescriptor) produced by the harness.
pub mod exception_kind {
    /// The program exited with a non-zero status.
    pub const EXIT_STATUS: &str = "ExitStatus";
    /// The program was terminated by a signal.
    pub const SIGNAL: &str = "Signal";
    /// The program exceeded its wall-clock deadline.
    pub const TIMEOUT: &str = "Timeout";
    /// The sandboxed process ended without producing a result record.
    pub const PROCESS_TERMINATED: &str = "ProcessTerminated";
}

/// Which harness the sandboxed process starts as.
///
/// This is always the first argument of the sandboxed process; the user's
/// entry point comes later and is only ever invoked by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessEntry {
    /// Buffer all output and print one `RunOutput` record at the end.
    Run,
    /// Print one frame per captured write as soon as it happens.
    Streaming,
}

impl HarnessEntry {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Streaming => "run-streaming",
        }
    }
}

impl fmt::Display for HarnessEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarnessEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Self::Run),
            "run-streaming" => Ok(Self::Streaming),
            other => Err(format!("Unknown harness entry: {other}")),
        }
    }
}
