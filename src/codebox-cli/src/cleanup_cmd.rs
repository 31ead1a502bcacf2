//! The `cleanup` command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use codebox_exec::{ExecConfig, cleanup_stale};

#[derive(Debug, Args)]
pub struct CleanupCommand {
    /// Only remove sessions older than this many seconds.
    #[arg(long, default_value_t = 3600)]
    pub max_age_secs: u64,
}

impl CleanupCommand {
    pub fn run(self, config_path: Option<&Path>) -> Result<i32> {
        let config = ExecConfig::load(config_path)?;
        let root = config.session_root();
        let removed = cleanup_stale(&root, Duration::from_secs(self.max_age_secs))
            .with_context(|| format!("Failed to clean {}", root.display()))?;

        tracing::info!(removed, root = %root.display(), "Cleanup finished");
        println!("Removed {removed} stale session(s) from {}", root.display());
        Ok(0)
    }
}
