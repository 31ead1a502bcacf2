//! Entry-point resolution.
//!
//! The entry point is named relative to the classpath roots. A dotted name
//! such as `demo.main` is looked up as `demo/main` first and then verbatim, so
//! both module-style names and plain file names work. Roots are searched in
//! classpath order, which puts the shared libraries ahead of the session's
//! own artifacts.

use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

/// A program the harness can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnableProgram {
    /// The executable file.
    pub path: PathBuf,
    /// The classpath root it was found under; used as the working directory.
    pub root: PathBuf,
}

/// Outcome of looking up an entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(RunnableProgram),
    NotFound,
    /// Something exists under that name but cannot be executed.
    NotInvokable { path: PathBuf },
}

/// Look up `name` under the classpath roots.
pub fn resolve_entry_point(classpath: &[PathBuf], name: &str) -> Resolution {
    let candidates = candidate_paths(name);
    if candidates.is_empty() {
        tracing::debug!("Rejected entry point name {name:?}");
        return Resolution::NotFound;
    }

    for root in classpath {
        for relative in &candidates {
            let path = root.join(relative);
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
                return Resolution::NotInvokable { path };
            }
            tracing::debug!("Resolved entry point {name} to {}", path.display());
            return Resolution::Found(RunnableProgram {
                path,
                root: root.clone(),
            });
        }
    }
    Resolution::NotFound
}

/// Relative paths `name` may refer to, in lookup order. Empty when the name
/// could escape its root.
fn candidate_paths(name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if name.contains('.') {
        let dotted = name.replace('.', "/");
        if is_confined(&dotted) {
            candidates.push(PathBuf::from(dotted));
        }
    }
    if is_confined(name) && !candidates.iter().any(|c| c.as_os_str() == name) {
        candidates.push(PathBuf::from(name));
    }
    candidates
}

/// A non-empty relative path made only of normal components.
fn is_confined(relative: &str) -> bool {
    !relative.is_empty()
        && !relative.split('/').any(str::is_empty)
        && Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
