//! Compiled artifact sets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Files produced by a compilation, keyed by path relative to the session
/// root.
///
/// Paths marked runnable are written with the executable bit set. The entry
/// point, when present, names the program the harness should start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledArtifactSet {
    files: BTreeMap<PathBuf, Vec<u8>>,
    runnable: BTreeSet<PathBuf>,
    entry_point: Option<String>,
}

impl CompiledArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents, false);
        self
    }

    /// Add an executable file.
    pub fn with_runnable(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents, true);
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>, runnable: bool) {
        let path = path.into();
        if runnable {
            self.runnable.insert(path.clone());
        } else {
            self.runnable.remove(&path);
        }
        self.files.insert(path, contents.into());
    }

    pub fn set_entry_point(&mut self, entry_point: Option<String>) {
        self.entry_point = entry_point;
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_path(), c.as_slice()))
    }

    pub fn is_runnable(&self, path: &Path) -> bool {
        self.runnable.contains(path)
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
