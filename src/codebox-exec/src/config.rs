//! Executor configuration.
//!
//! Loaded from a TOML file. The file is looked up in order:
//! 1. an explicit path (the CLI's `--config`)
//! 2. the `CODEBOX_CONFIG` environment variable
//! 3. `<config dir>/codebox/config.toml`
//!
//! Missing optional files fall back to defaults. Relative paths in the file
//! are resolved against `work_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExecError, Result};

/// Environment variable for a custom config file path.
pub const CODEBOX_CONFIG_ENV: &str = "CODEBOX_CONFIG";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the harness binary looked up next to the current executable.
pub const HARNESS_BINARY: &str = "codebox-harness";

/// Default policy template file name, relative to `work_dir`.
pub const DEFAULT_POLICY_FILE: &str = "codebox.policy.toml";

pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 32;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    /// Base directory; sessions live under `<work_dir>/tmp`.
    pub work_dir: PathBuf,
    /// The harness binary.
    pub runtime: PathBuf,
    /// Shared libraries, substituted for `%%LIB_DIR%%`.
    pub library_dir: PathBuf,
    /// Classpath entries placed before the session directory. Empty means
    /// `[library_dir]`.
    pub library_classpath: Vec<PathBuf>,
    /// Security policy template.
    pub policy_template: PathBuf,
    /// Address-space ceiling for user programs, in MiB.
    pub memory_limit_mb: u64,
    /// Wall-clock limit for the whole harness process, in seconds.
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::current_dir().unwrap_or_default(),
            runtime: default_runtime(),
            library_dir: PathBuf::from("lib"),
            library_classpath: Vec::new(),
            policy_template: PathBuf::from(DEFAULT_POLICY_FILE),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `codebox-harness` next to the running executable, or on `PATH`.
fn default_runtime() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(HARNESS_BINARY)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(HARNESS_BINARY))
}

impl ExecConfig {
    /// Load from the first config file found, then resolve and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match find_config_file(explicit) {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading config file");
                let text = std::fs::read_to_string(&path)?;
                Self::from_toml(&text).map_err(|e| {
                    ExecError::Config(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
            Some(path) if explicit.is_some() => {
                return Err(ExecError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        let config = config.resolved();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Make every relative path absolute against `work_dir`.
    pub fn resolved(mut self) -> Self {
        if self.work_dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                self.work_dir = cwd.join(&self.work_dir);
            }
        }
        let base = self.work_dir.clone();
        // A bare binary name is looked up on PATH.
        if self.runtime.is_relative() && self.runtime.components().count() > 1 {
            self.runtime = base.join(&self.runtime);
        }
        for path in [&mut self.library_dir, &mut self.policy_template] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        for path in &mut self.library_classpath {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_mb == 0 {
            return Err(ExecError::Config("memory_limit_mb must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ExecError::Config("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Root under which session directories are created.
    pub fn session_root(&self) -> PathBuf {
        self.work_dir.join("tmp")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Library entries of the classpath, in order.
    pub fn classpath(&self) -> Vec<PathBuf> {
        if self.library_classpath.is_empty() {
            vec![self.library_dir.clone()]
        } else {
            self.library_classpath.clone()
        }
    }
}

/// The config file to load, if any location names one.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(val) = std::env::var(CODEBOX_CONFIG_ENV) {
        if !val.is_empty() {
            debug!(path = %val, "Using CODEBOX_CONFIG");
            return Some(PathBuf::from(val));
        }
    }
    dirs::config_dir().map(|dir| dir.join("codebox").join(CONFIG_FILE))
}
