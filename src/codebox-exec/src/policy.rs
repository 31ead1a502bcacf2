//! Security policy templates.
//!
//! The template is a TOML file with two placeholders, `%%GENERATED%%` for the
//! absolute session directory and `%%LIB_DIR%%` for the shared library
//! directory. Each session gets its own rendered copy.

use std::path::Path;

use crate::error::{ExecError, Result};
use crate::session::{SessionDirectory, SessionId};

/// Placeholder for the session directory.
pub const GENERATED_TOKEN: &str = "%%GENERATED%%";
/// Placeholder for the shared library directory.
pub const LIB_DIR_TOKEN: &str = "%%LIB_DIR%%";

/// Substitute every occurrence of both placeholders.
pub fn render_policy(template: &str, session_path: &Path, library_path: &Path) -> String {
    template
        .replace(GENERATED_TOKEN, &session_path.to_string_lossy())
        .replace(LIB_DIR_TOKEN, &library_path.to_string_lossy())
}

/// A loaded policy template.
#[derive(Debug, Clone)]
pub struct PolicyTemplate {
    text: String,
    file_name: String,
}

impl PolicyTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ExecError::PolicyTemplate {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ExecError::Config(format!("Not a file path: {}", path.display())))?;
        Ok(Self { text, file_name })
    }

    pub fn from_text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_name: file_name.into(),
        }
    }

    /// Base name the rendered copy is written under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render for one session.
    pub fn render(&self, session: &SessionDirectory, library_path: &Path) -> RenderedPolicy {
        RenderedPolicy {
            session_id: session.id().clone(),
            text: render_policy(&self.text, session.path(), library_path),
        }
    }
}

/// A policy rendered for exactly one session.
#[derive(Debug, Clone)]
pub struct RenderedPolicy {
    session_id: SessionId,
    text: String,
}

impl RenderedPolicy {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
