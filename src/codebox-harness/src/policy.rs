//! Rendered security policy.
//!
//! The executor renders one policy file per session from a TOML template and
//! passes its path as the harness's second argument. A rendered policy embeds
//! the absolute session directory, so it only makes sense for the session it
//! was written into.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Placeholders that must have been substituted before the policy reaches us.
const PLACEHOLDERS: [&str; 2] = ["%%GENERATED%%", "%%LIB_DIR%%"];

/// How strictly enforcement failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Enforcement {
    /// Log and continue when the kernel lacks a feature.
    #[default]
    BestEffort,
    /// Abort the run when any restriction cannot be applied.
    Required,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxSection {
    #[serde(default)]
    pub enforcement: Enforcement,
}

/// Filesystem access granted to the sandboxed process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemRules {
    /// Trees that may be read and executed.
    #[serde(default)]
    pub read_only: Vec<PathBuf>,
    /// Trees that may also be written.
    #[serde(default)]
    pub writable: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkRules {
    #[serde(default)]
    pub allow: bool,
    /// Whether AF_UNIX sockets may still be created when `allow` is false.
    #[serde(default = "default_allow_unix")]
    pub allow_unix: bool,
}

impl Default for NetworkRules {
    fn default() -> Self {
        Self {
            allow: false,
            allow_unix: default_allow_unix(),
        }
    }
}

fn default_allow_unix() -> bool {
    true
}

/// Per-run resource limits. The memory ceiling is not here; it arrives as a
/// harness argument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyLimits {
    /// RLIMIT_CPU, in seconds.
    pub cpu_seconds: Option<u64>,
    /// Wall-clock deadline for the user program, in milliseconds.
    pub wall_clock_ms: Option<u64>,
    /// RLIMIT_FSIZE, in bytes.
    pub max_file_size: Option<u64>,
    /// RLIMIT_NOFILE.
    pub max_open_files: Option<u64>,
    /// RLIMIT_NPROC.
    pub max_processes: Option<u64>,
    /// Captured output beyond this many bytes is dropped.
    pub max_output_bytes: Option<usize>,
}

/// A rendered security policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityPolicy {
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub filesystem: FilesystemRules,
    #[serde(default)]
    pub network: NetworkRules,
    #[serde(default)]
    pub limits: PolicyLimits,
}

impl SecurityPolicy {
    /// Read and parse a rendered policy file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::PolicyRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Parse rendered policy text. `path` is only used in error messages.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        if let Some(token) = PLACEHOLDERS.into_iter().find(|t| text.contains(t)) {
            return Err(HarnessError::UnrenderedPolicy {
                path: path.to_path_buf(),
                token,
            });
        }
        toml::from_str(text).map_err(|source| HarnessError::PolicyParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply the filesystem and network restrictions to the current process.
    ///
    /// Restrictions are inherited by every process the harness starts
    /// afterwards. Resource limits are applied separately, in the user
    /// program's process only.
    pub fn enforce(&self) -> Result<()> {
        match self.apply_restrictions() {
            Ok(()) => Ok(()),
            Err(e) if self.sandbox.enforcement == Enforcement::BestEffort => {
                tracing::warn!("Sandbox restrictions not fully applied: {e:#}");
                Ok(())
            }
            Err(e) => Err(HarnessError::PolicyEnforcement(format!("{e:#}"))),
        }
    }

    #[cfg(target_os = "linux")]
    fn apply_restrictions(&self) -> anyhow::Result<()> {
        set_no_new_privs()?;

        // Seccomp first, then Landlock.
        crate::seccomp::apply_syscall_filter(&self.network)?;

        crate::landlock::apply_filesystem_rules(
            &self.filesystem.read_only,
            &self.filesystem.writable,
        )?;

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn apply_restrictions(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!(
            "filesystem and network restrictions are only available on Linux"
        ))
    }
}

/// Set PR_SET_NO_NEW_PRIVS.
#[cfg(target_os = "linux")]
fn set_no_new_privs() -> anyhow::Result<()> {
    let result = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if result != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = r#"
[sandbox]
enforcement = "required"

[filesystem]
read_only = ["/srv/lib", "/srv/tmp/abc", "/usr"]
writable = []

[network]
allow = false

[limits]
cpu_seconds = 5
wall_clock_ms = 2000
max_output_bytes = 4096
"#;

    #[test]
    fn test_parse_rendered_policy() {
        let policy = SecurityPolicy::parse(Path::new("p.toml"), RENDERED).unwrap();
        assert_eq!(policy.sandbox.enforcement, Enforcement::Required);
        assert_eq!(policy.filesystem.read_only.len(), 3);
        assert!(!policy.network.allow);
        assert!(policy.network.allow_unix);
        assert_eq!(policy.limits.cpu_seconds, Some(5));
        assert_eq!(policy.limits.wall_clock_ms, Some(2000));
        assert_eq!(policy.limits.max_output_bytes, Some(4096));
        assert_eq!(policy.limits.max_processes, None);
    }

    #[test]
    fn test_empty_policy_uses_defaults() {
        let policy = SecurityPolicy::parse(Path::new("p.toml"), "").unwrap();
        assert_eq!(policy.sandbox.enforcement, Enforcement::BestEffort);
        assert!(policy.filesystem.read_only.is_empty());
        assert!(!policy.network.allow);
    }

    #[test]
    fn test_unrendered_policy_is_rejected() {
        let text = "[filesystem]\nread_only = [\"%%GENERATED%%\"]\n";
        let err = SecurityPolicy::parse(Path::new("p.toml"), text).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::UnrenderedPolicy {
                token: "%%GENERATED%%",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = SecurityPolicy::parse(Path::new("p.toml"), "[network]\nallowed = true\n")
            .unwrap_err();
        assert!(matches!(err, HarnessError::PolicyParse { .. }));
    }

    #[test]
    fn test_missing_policy_file() {
        let err = SecurityPolicy::load(Path::new("/nonexistent/codebox.policy.toml")).unwrap_err();
        assert_eq!(err.kind(), "PolicyError");
    }
}
