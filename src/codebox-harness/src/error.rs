//! Harness error types.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Failures of the harness itself, as opposed to failures of the user program.
///
/// Every variant ends in the fallback record; none of them is reported as a
/// user exception. Messages name what failed; the underlying error is kept
/// as the source and reported through [`HarnessError::causes`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid harness arguments: {0}")]
    InvalidArguments(String),

    #[error("Failed to read policy {path}")]
    PolicyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy {path}")]
    PolicyParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Policy {path} still contains the placeholder {token}")]
    UnrenderedPolicy { path: PathBuf, token: &'static str },

    #[error("Failed to enforce policy: {0}")]
    PolicyEnforcement(String),

    #[error("Failed to start {program}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O failure")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize the result")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Short name used as the type in the fallback record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::PolicyRead { .. } | Self::PolicyParse { .. } | Self::UnrenderedPolicy { .. } => {
                "PolicyError"
            }
            Self::PolicyEnforcement(_) => "PolicyEnforcementError",
            Self::Spawn { .. } => "SpawnError",
            Self::Io(_) => "IOException",
            Self::Json(_) => "SerializationError",
        }
    }

    /// Display text of every underlying error, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            causes.push(err.to_string());
            source = std::error::Error::source(err);
        }
        causes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_spawn_error_keeps_cause_separate() {
        let err = HarnessError::Spawn {
            program: PathBuf::from("/s/main"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "Failed to start /s/main");
        assert_eq!(err.causes(), vec!["no such file".to_string()]);
        assert_eq!(err.kind(), "SpawnError");
    }

    #[test]
    fn test_nested_causes_are_listed_in_order() {
        let inner = io::Error::other("disk gone");
        let outer = io::Error::other(Wrapped(inner));
        let err = HarnessError::from(outer);
        assert_eq!(err.to_string(), "I/O failure");
        assert_eq!(
            err.causes(),
            vec!["write failed".to_string(), "disk gone".to_string()]
        );
    }

    #[test]
    fn test_errors_without_source_have_no_causes() {
        let err = HarnessError::InvalidArguments("missing policy".to_string());
        assert!(err.causes().is_empty());
    }

    #[derive(Debug, Error)]
    #[error("write failed")]
    struct Wrapped(#[source] io::Error);
}
