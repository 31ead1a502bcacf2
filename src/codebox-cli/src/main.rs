//! Codebox CLI - Main entry point.

use anyhow::Result;
use clap::Parser;

use codebox_cli::cli::{Cli, dispatch_command, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let code = dispatch_command(cli).await?;
    std::process::exit(code)
}
