//! setrlimit-based resource limits for the user program.
//!
//! Applied in the forked child right before `exec`, so the harness itself is
//! never constrained by the limits it imposes. Everything in
//! [`ChildLimits::apply_in_child`] must stay async-signal-safe: plain
//! syscalls, no allocation.

use crate::policy::PolicyLimits;

const MIB: u64 = 1024 * 1024;

/// Limits for one user program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildLimits {
    /// RLIMIT_AS, in bytes.
    pub address_space: Option<u64>,
    /// RLIMIT_CPU, in seconds.
    pub cpu_seconds: Option<u64>,
    /// RLIMIT_FSIZE, in bytes.
    pub file_size: Option<u64>,
    /// RLIMIT_NOFILE.
    pub open_files: Option<u64>,
    /// RLIMIT_NPROC.
    pub processes: Option<u64>,
}

impl ChildLimits {
    /// Combine the memory ceiling argument (MiB) with the policy's limits.
    /// A ceiling of zero means no address-space limit.
    pub fn new(memory_limit_mb: u64, policy: &PolicyLimits) -> Self {
        Self {
            address_space: (memory_limit_mb > 0).then(|| memory_limit_mb.saturating_mul(MIB)),
            cpu_seconds: policy.cpu_seconds,
            file_size: policy.max_file_size,
            open_files: policy.max_open_files,
            processes: policy.max_processes,
        }
    }

    /// Put the child in its own process group and apply the limits.
    ///
    /// Runs between `fork` and `exec`.
    pub fn apply_in_child(&self) -> std::io::Result<()> {
        // Own process group so the whole tree can be killed at the deadline.
        if unsafe { libc::setpgid(0, 0) } == -1 {
            return Err(std::io::Error::last_os_error());
        }

        // Die with the harness, which is what the executor kills on timeout.
        #[cfg(target_os = "linux")]
        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) } == -1 {
            return Err(std::io::Error::last_os_error());
        }

        if let Some(bytes) = self.address_space {
            set_rlimit(libc::RLIMIT_AS, bytes)?;
        }
        if let Some(seconds) = self.cpu_seconds {
            set_rlimit(libc::RLIMIT_CPU, seconds)?;
        }
        if let Some(bytes) = self.file_size {
            set_rlimit(libc::RLIMIT_FSIZE, bytes)?;
        }
        if let Some(files) = self.open_files {
            set_rlimit(libc::RLIMIT_NOFILE, files)?;
        }
        if let Some(processes) = self.processes {
            set_rlimit(libc::RLIMIT_NPROC, processes)?;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(target_os = "linux"))]
type Resource = libc::c_int;

fn set_rlimit(resource: Resource, limit: u64) -> std::io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit as libc::rlim_t,
        rlim_max: limit as libc::rlim_t,
    };

    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ceiling_in_bytes() {
        let limits = ChildLimits::new(32, &PolicyLimits::default());
        assert_eq!(limits.address_space, Some(32 * 1024 * 1024));
        assert_eq!(limits.cpu_seconds, None);
    }

    #[test]
    fn test_zero_ceiling_means_unlimited() {
        let limits = ChildLimits::new(0, &PolicyLimits::default());
        assert_eq!(limits.address_space, None);
    }

    #[test]
    fn test_policy_limits_are_carried() {
        let policy = PolicyLimits {
            cpu_seconds: Some(3),
            max_file_size: Some(1024),
            max_open_files: Some(32),
            max_processes: Some(8),
            ..Default::default()
        };
        let limits = ChildLimits::new(64, &policy);
        assert_eq!(
            limits,
            ChildLimits {
                address_space: Some(64 * 1024 * 1024),
                cpu_seconds: Some(3),
                file_size: Some(1024),
                open_files: Some(32),
                processes: Some(8),
            }
        );
    }
}
