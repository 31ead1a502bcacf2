//! Executor error types.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

/// Infrastructure failures.
///
/// Failures of the user program are never reported through this type; they
/// end up in the run's [`RunOutput`](codebox_protocol::RunOutput).
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read policy template {path}: {source}")]
    PolicyTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Policy rendered for session {rendered} cannot be written into session {session}")]
    PolicySessionMismatch { rendered: String, session: String },

    #[error("Artifact path escapes the session directory: {0}")]
    InvalidArtifactPath(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Classpath entry cannot be joined: {0}")]
    InvalidClasspath(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Output sink closed")]
    SinkClosed,

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<tokio::task::JoinError> for ExecError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
