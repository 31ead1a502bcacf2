//! Landlock filesystem isolation.
//!
//! Unlike a workspace sandbox, a user program only gets read access to the
//! trees its policy lists (the shared libraries, its own session directory and
//! the system runtime). Write access is limited to the policy's writable roots
//! and `/dev/null`.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use landlock::{
    ABI, Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr, RulesetCreatedAttr,
    RulesetStatus,
};

/// Apply Landlock filesystem rules to the current process.
pub fn apply_filesystem_rules(read_only: &[PathBuf], writable: &[PathBuf]) -> Result<()> {
    let abi = ABI::V5;
    let access_rw = AccessFs::from_all(abi);
    let access_ro = AccessFs::from_read(abi);

    // Roots that do not exist on this host are skipped rather than failing the run.
    let read_only: Vec<&PathBuf> = read_only.iter().filter(|p| p.exists()).collect();
    let writable: Vec<&PathBuf> = writable.iter().filter(|p| p.exists()).collect();

    let mut ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(access_rw)?
        .create()?
        .add_rules(landlock::path_beneath_rules(&["/dev/null"], access_rw))?
        .set_no_new_privs(true);

    if !read_only.is_empty() {
        ruleset = ruleset.add_rules(landlock::path_beneath_rules(&read_only, access_ro))?;
    }
    if !writable.is_empty() {
        ruleset = ruleset.add_rules(landlock::path_beneath_rules(&writable, access_rw))?;
    }

    let status = ruleset.restrict_self()?;

    if status.ruleset == RulesetStatus::NotEnforced {
        return Err(anyhow!("Landlock ruleset not enforced"));
    }

    tracing::debug!(
        read_only = read_only.len(),
        writable = writable.len(),
        "Landlock rules applied"
    );
    Ok(())
}
