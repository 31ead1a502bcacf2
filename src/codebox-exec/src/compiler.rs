//! The compiler seam.
//!
//! Parsing, analysis and code generation live outside this crate. The
//! executor only needs something that turns a [`Project`] into diagnostics
//! and, when successful, a [`CompiledArtifactSet`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codebox_protocol::Diagnostic;
use walkdir::WalkDir;

use crate::artifacts::CompiledArtifactSet;
use crate::error::{ExecError, Result};

/// A user submission.
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// Source files keyed by relative path.
    pub sources: BTreeMap<PathBuf, String>,
    /// Program arguments as typed by the user, space separated.
    pub args: String,
}

/// Output of a compiler.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when nothing was produced.
    pub artifacts: Option<CompiledArtifactSet>,
}

impl Compilation {
    pub fn new(diagnostics: Vec<Diagnostic>, artifacts: Option<CompiledArtifactSet>) -> Self {
        Self {
            diagnostics,
            artifacts,
        }
    }
}

/// Turns projects into runnable artifacts. May be CPU-bound; the executor
/// calls it on a blocking thread.
pub trait Compiler: Send + Sync {
    fn compile(&self, project: &Project) -> Result<Compilation>;
}

/// Returns the same compilation for every project.
#[derive(Debug, Clone, Default)]
pub struct StaticCompiler {
    compilation: Compilation,
}

impl StaticCompiler {
    pub fn new(compilation: Compilation) -> Self {
        Self { compilation }
    }
}

impl Compiler for StaticCompiler {
    fn compile(&self, _project: &Project) -> Result<Compilation> {
        Ok(self.compilation.clone())
    }
}

/// Build an artifact set from a directory of pre-built files. Files with an
/// executable bit are marked runnable.
pub fn load_artifact_dir(dir: &Path, entry_point: Option<&str>) -> Result<CompiledArtifactSet> {
    if !dir.is_dir() {
        return Err(ExecError::Config(format!(
            "Artifact directory not found: {}",
            dir.display()
        )));
    }

    let mut artifacts = CompiledArtifactSet::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ExecError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| ExecError::InvalidArtifactPath(entry.path().to_path_buf()))?
            .to_path_buf();
        let contents = std::fs::read(entry.path())?;
        let runnable = is_executable(&entry.metadata().map_err(|e| ExecError::Io(e.into()))?);
        artifacts.insert(relative, contents, runnable);
    }
    artifacts.set_entry_point(entry_point.map(str::to_string));
    Ok(artifacts)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
