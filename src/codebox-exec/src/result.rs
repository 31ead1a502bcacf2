//! Results returned to callers.

use codebox_protocol::{Diagnostic, RunOutput};
use serde::Serialize;

/// Message used when compilation produced nothing runnable.
pub const NO_ARTIFACTS_MESSAGE: &str = "No compiled artifacts were produced.";

/// What happened to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionOutcome {
    /// Compilation reported errors; nothing was run.
    NotRun,
    /// The request was refused before running.
    Restricted { message: String },
    /// The program ran; its output and failure, if any.
    Completed(RunOutput),
}

/// Diagnostics plus the outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn not_run(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            outcome: ExecutionOutcome::NotRun,
        }
    }

    pub fn restricted(diagnostics: Vec<Diagnostic>, message: impl Into<String>) -> Self {
        Self {
            diagnostics,
            outcome: ExecutionOutcome::Restricted {
                message: message.into(),
            },
        }
    }

    pub fn completed(diagnostics: Vec<Diagnostic>, output: RunOutput) -> Self {
        Self {
            diagnostics,
            outcome: ExecutionOutcome::Completed(output),
        }
    }

    pub fn run_output(&self) -> Option<&RunOutput> {
        match &self.outcome {
            ExecutionOutcome::Completed(output) => Some(output),
            ExecutionOutcome::NotRun | ExecutionOutcome::Restricted { .. } => None,
        }
    }
}
