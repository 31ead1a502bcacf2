//! Per-run session directories.
//!
//! Every run gets its own directory under the sessions root, named by a
//! random session id. The [`SessionDirectory`] handle is the only owner of
//! that directory: all paths inside it are derived from the handle, and the
//! directory is removed exactly once, either by [`SessionDirectory::destroy`]
//! or when the handle is dropped.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::artifacts::CompiledArtifactSet;
use crate::error::{ExecError, Result};
use crate::policy::RenderedPolicy;

/// Random identifier of one session: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `name` has the shape of a session id.
    pub fn is_session_name(name: &str) -> bool {
        name.len() == 32 && name.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned handle on `<root>/<session_id>/`.
#[derive(Debug)]
pub struct SessionDirectory {
    id: SessionId,
    path: PathBuf,
    destroyed: bool,
}

impl SessionDirectory {
    /// Create a fresh, empty session directory under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        let root = std::path::absolute(root)?;
        fs::create_dir_all(&root)?;

        let id = SessionId::generate();
        let path = root.join(id.as_str());
        // create_dir, not create_dir_all: an existing directory is a collision.
        fs::create_dir(&path).map_err(|source| ExecError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(session_id = %id, path = %path.display(), "Session created");
        Ok(Self {
            id,
            path,
            destroyed: false,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a relative path inside the session.
    ///
    /// Absolute paths and paths with `..`, `.` or prefix components are
    /// rejected.
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        let confined = !relative.as_os_str().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !confined {
            return Err(ExecError::InvalidArtifactPath(relative.to_path_buf()));
        }
        Ok(self.path.join(relative))
    }

    /// Write every artifact into the session.
    ///
    /// Stops at the first failure. The partially written session must not be
    /// run; dropping the handle removes it.
    pub fn write_artifacts(&self, artifacts: &CompiledArtifactSet) -> Result<()> {
        for (relative, contents) in artifacts.files() {
            let path = self.resolve(relative)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| ExecError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::write(&path, contents).map_err(|source| ExecError::Write {
                path: path.clone(),
                source,
            })?;
            set_mode(&path, artifacts.is_runnable(relative))?;
        }
        debug!(session_id = %self.id, files = artifacts.len(), "Artifacts written");
        Ok(())
    }

    /// Write the rendered policy at the session root and return its path.
    pub fn write_policy(&self, policy: &RenderedPolicy, file_name: &str) -> Result<PathBuf> {
        if policy.session_id() != &self.id {
            return Err(ExecError::PolicySessionMismatch {
                rendered: policy.session_id().to_string(),
                session: self.id.to_string(),
            });
        }
        let path = self.resolve(Path::new(file_name))?;
        fs::write(&path, policy.text()).map_err(|source| ExecError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Remove the session directory and everything in it.
    pub fn destroy(mut self) -> std::io::Result<()> {
        self.destroyed = true;
        remove_session(&self.id, &self.path)
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Err(e) = remove_session(&self.id, &self.path) {
            warn!(session_id = %self.id, "Failed to remove session directory: {e}");
        }
    }
}

fn remove_session(id: &SessionId, path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(session_id = %id, "Session removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, runnable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if runnable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        ExecError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _runnable: bool) -> Result<()> {
    Ok(())
}

/// Remove session directories under `root` last modified more than
/// `max_age` ago. Returns how many were removed.
///
/// Only entries named like a session id are touched, so a shared root is
/// safe. A session in use by a live run is never that old.
pub fn cleanup_stale(root: &Path, max_age: Duration) -> std::io::Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_str().is_some_and(SessionId::is_session_name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    if removed > 0 {
        debug!(root = %root.display(), removed, "Removed stale sessions");
    }
    Ok(removed)
}
