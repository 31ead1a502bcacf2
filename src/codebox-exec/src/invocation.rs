//! Harness invocation specs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use codebox_protocol::HarnessEntry;

use crate::error::{ExecError, Result};
use crate::session::SessionDirectory;

/// Everything needed to start the harness for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    /// The harness binary.
    pub runtime: PathBuf,
    pub entry: HarnessEntry,
    /// Absolute path of the rendered policy.
    pub policy_path: PathBuf,
    pub memory_limit_mb: u64,
    /// Library roots first, session directory last.
    pub classpath: Vec<PathBuf>,
    pub user_entry: Option<String>,
    pub user_args: Vec<String>,
    /// Only used for logging.
    pub session_id: String,
}

impl InvocationSpec {
    /// The harness argument vector, without the program name.
    pub fn to_args(&self) -> Result<Vec<OsString>> {
        let classpath = std::env::join_paths(&self.classpath)
            .map_err(|e| ExecError::InvalidClasspath(e.to_string()))?;

        let mut args = vec![
            OsString::from(self.entry.as_str()),
            self.policy_path.clone().into_os_string(),
            OsString::from(self.memory_limit_mb.to_string()),
            classpath,
        ];
        // Without an entry point the first user argument would be taken for one.
        if let Some(entry) = &self.user_entry {
            args.push(OsString::from(entry));
            args.extend(self.user_args.iter().map(OsString::from));
        }
        Ok(args)
    }
}

/// Builds [`InvocationSpec`]s from the fixed parts of the configuration.
#[derive(Debug, Clone)]
pub struct InvocationSpecBuilder {
    runtime: PathBuf,
    library_classpath: Vec<PathBuf>,
    memory_limit_mb: u64,
}

impl InvocationSpecBuilder {
    pub fn new(runtime: PathBuf, library_classpath: Vec<PathBuf>, memory_limit_mb: u64) -> Self {
        Self {
            runtime,
            library_classpath,
            memory_limit_mb,
        }
    }

    pub fn build(
        &self,
        entry: HarnessEntry,
        session: &SessionDirectory,
        policy_path: &Path,
        user_entry: Option<&str>,
        user_args: &[String],
    ) -> InvocationSpec {
        let mut classpath = self.library_classpath.clone();
        classpath.push(session.path().to_path_buf());

        let user_entry = user_entry.filter(|e| !e.is_empty()).map(str::to_string);
        let user_args = if user_entry.is_some() {
            user_args.to_vec()
        } else {
            Vec::new()
        };

        InvocationSpec {
            runtime: self.runtime.clone(),
            entry,
            policy_path: policy_path.to_path_buf(),
            memory_limit_mb: self.memory_limit_mb,
            classpath,
            user_entry,
            user_args,
            session_id: session.id().to_string(),
        }
    }
}

/// Split a request's argument string on whitespace, dropping empty tokens.
pub fn split_program_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}
