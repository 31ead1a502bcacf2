//! Seccomp syscall filter built from the policy's network rules.
//!
//! Installed on the harness before the user program starts and inherited by
//! it across `exec`. Denied syscalls fail with EPERM, so well-behaved programs
//! see an ordinary error instead of being killed.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use seccompiler::{
    BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition, SeccompFilter,
    SeccompRule, TargetArch,
};

use crate::policy::NetworkRules;

type SyscallRules = BTreeMap<i64, Vec<SeccompRule>>;

/// Refused for every run: one user program must not inspect another process.
const PROCESS_INSPECTION: &[libc::c_long] = &[
    libc::SYS_ptrace,
    libc::SYS_process_vm_readv,
    libc::SYS_process_vm_writev,
];

/// Refused when the policy denies network access.
const NETWORK: &[libc::c_long] = &[
    libc::SYS_connect,
    libc::SYS_accept,
    libc::SYS_accept4,
    libc::SYS_bind,
    libc::SYS_listen,
    libc::SYS_getpeername,
    libc::SYS_getsockname,
    libc::SYS_shutdown,
    libc::SYS_sendto,
    libc::SYS_sendmsg,
    libc::SYS_sendmmsg,
    libc::SYS_recvmsg,
    libc::SYS_recvmmsg,
    libc::SYS_getsockopt,
    libc::SYS_setsockopt,
];

/// Syscalls to refuse for a run with the given network rules. An empty rule
/// list refuses the syscall unconditionally.
pub fn syscall_rules(network: &NetworkRules) -> Result<SyscallRules> {
    let mut rules = SyscallRules::new();
    for &nr in PROCESS_INSPECTION {
        rules.insert(nr, Vec::new());
    }
    if network.allow {
        return Ok(rules);
    }

    for &nr in NETWORK {
        rules.insert(nr, Vec::new());
    }

    // Socket creation: AF_UNIX only when the policy keeps local IPC open.
    let creation = if network.allow_unix {
        vec![SeccompRule::new(vec![SeccompCondition::new(
            0,
            SeccompCmpArgLen::Dword,
            SeccompCmpOp::Ne,
            libc::AF_UNIX as u64,
        )?])?]
    } else {
        Vec::new()
    };
    rules.insert(libc::SYS_socket, creation.clone());
    rules.insert(libc::SYS_socketpair, creation);
    Ok(rules)
}

/// Compile the filter for this machine without installing it.
pub fn compile_filter(network: &NetworkRules) -> Result<BpfProgram> {
    let filter = SeccompFilter::new(
        syscall_rules(network)?,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        target_arch()?,
    )?;
    let program: BpfProgram = filter.try_into()?;
    Ok(program)
}

/// Install the filter on the current process.
pub fn apply_syscall_filter(network: &NetworkRules) -> Result<()> {
    let program = compile_filter(network)?;
    seccompiler::apply_filter(&program)?;

    tracing::debug!(
        network = network.allow,
        unix_sockets = network.allow_unix,
        "Seccomp filter applied"
    );
    Ok(())
}

fn target_arch() -> Result<TargetArch> {
    if cfg!(target_arch = "x86_64") {
        Ok(TargetArch::x86_64)
    } else if cfg!(target_arch = "aarch64") {
        Ok(TargetArch::aarch64)
    } else {
        Err(anyhow!("Unsupported architecture for seccomp filter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(allow: bool, allow_unix: bool) -> SyscallRules {
        syscall_rules(&NetworkRules { allow, allow_unix }).unwrap()
    }

    #[test]
    fn test_process_inspection_always_denied() {
        for rules in [rules(true, true), rules(false, true), rules(false, false)] {
            assert!(rules[&libc::SYS_ptrace].is_empty());
            assert!(rules.contains_key(&libc::SYS_process_vm_readv));
        }
    }

    #[test]
    fn test_network_allowed_leaves_sockets_alone() {
        let rules = rules(true, false);
        assert_eq!(rules.len(), PROCESS_INSPECTION.len());
        assert!(!rules.contains_key(&libc::SYS_connect));
        assert!(!rules.contains_key(&libc::SYS_socket));
    }

    #[test]
    fn test_denied_network_keeps_unix_sockets() {
        let rules = rules(false, true);
        assert!(rules[&libc::SYS_connect].is_empty());
        // One conditional rule: refuse any domain other than AF_UNIX.
        assert_eq!(rules[&libc::SYS_socket].len(), 1);
        assert_eq!(rules[&libc::SYS_socketpair].len(), 1);
    }

    #[test]
    fn test_denied_network_without_unix_refuses_all_sockets() {
        let rules = rules(false, false);
        assert!(rules[&libc::SYS_socket].is_empty());
        assert!(rules[&libc::SYS_socketpair].is_empty());
        assert_eq!(rules.len(), PROCESS_INSPECTION.len() + NETWORK.len() + 2);
    }

    #[test]
    fn test_policy_network_section_drives_filter() {
        let policy = crate::policy::SecurityPolicy::parse(
            std::path::Path::new("p.toml"),
            "[network]\nallow = false\nallow_unix = false\n",
        )
        .unwrap();
        let rules = syscall_rules(&policy.network).unwrap();
        assert!(rules[&libc::SYS_socket].is_empty());
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_filter_compiles() {
        let program = compile_filter(&NetworkRules::default()).unwrap();
        assert!(!program.is_empty());
    }
}
