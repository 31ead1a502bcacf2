//! Command-line arguments and dispatch.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cleanup_cmd::CleanupCommand;
use crate::run_cmd::RunCommand;

/// Run programs inside the codebox sandbox.
#[derive(Debug, Parser)]
#[command(name = "codebox", version, about)]
pub struct Cli {
    /// Configuration file (overrides CODEBOX_CONFIG).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level for codebox's own crates.
    #[arg(long, global = true, env = "CODEBOX_LOG", default_value_t = Level::WARN)]
    pub log_level: Level,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Shorthand for `--log-level trace`.
    #[arg(long, global = true)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a directory of compiled artifacts.
    Run(RunCommand),
    /// Remove session directories left behind by earlier runs.
    Cleanup(CleanupCommand),
}

impl Cli {
    /// `--trace` and `--verbose` win over `--log-level` and CODEBOX_LOG.
    pub fn effective_log_level(&self) -> Level {
        if self.trace {
            Level::TRACE
        } else if self.verbose {
            Level::DEBUG
        } else {
            self.log_level
        }
    }
}

/// Logs go to stderr; stdout carries results only. A non-empty RUST_LOG
/// replaces the whole filter.
pub fn init_logging(cli: &Cli) {
    let level = cli.effective_log_level().to_string().to_ascii_lowercase();
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(format!(
            "warn,codebox_cli={level},codebox_exec={level},codebox_protocol={level}"
        )),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the selected command and return the process exit code.
pub async fn dispatch_command(cli: Cli) -> Result<i32> {
    let config = cli.config;
    match cli.command {
        Commands::Run(cmd) => cmd.run(config.as_deref()).await,
        Commands::Cleanup(cmd) => cmd.run(config.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_level_flag() {
        let cli = Cli::parse_from(["codebox", "--log-level", "debug", "cleanup"]);
        assert_eq!(cli.effective_log_level(), Level::DEBUG);

        let cli = Cli::parse_from(["codebox", "cleanup", "--log-level", "ERROR"]);
        assert_eq!(cli.effective_log_level(), Level::ERROR);

        assert!(Cli::try_parse_from(["codebox", "--log-level", "loud", "cleanup"]).is_err());
    }

    #[test]
    fn test_verbose_and_trace_flags() {
        let cli = Cli::parse_from(["codebox", "-v", "--log-level", "error", "cleanup"]);
        assert_eq!(cli.effective_log_level(), Level::DEBUG);

        let cli = Cli::parse_from(["codebox", "cleanup", "-v", "--trace"]);
        assert_eq!(cli.effective_log_level(), Level::TRACE);
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from([
            "codebox",
            "--config",
            "/etc/codebox.toml",
            "run",
            "build/out",
            "--entry",
            "demo.main",
            "--stream",
            "--",
            "-n",
            "3",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/codebox.toml")));
        let Commands::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.artifacts, PathBuf::from("build/out"));
        assert_eq!(run.entry.as_deref(), Some("demo.main"));
        assert!(run.stream);
        assert_eq!(run.args, vec!["-n".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_cleanup_default_age() {
        let cli = Cli::parse_from(["codebox", "cleanup"]);
        let Commands::Cleanup(cleanup) = cli.command else {
            panic!("expected cleanup command");
        };
        assert_eq!(cleanup.max_age_secs, 3600);
    }
}
