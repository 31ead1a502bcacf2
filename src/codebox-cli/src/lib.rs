//! Codebox CLI.
//!
//! Runs a directory of pre-built artifacts through the sandboxed execution
//! pipeline, the same way the service does for compiled submissions.
//!
//! - `cli` - argument parsing, logging setup and dispatch
//! - `run_cmd` - the `run` command
//! - `cleanup_cmd` - the `cleanup` command

pub mod cleanup_cmd;
pub mod cli;
pub mod run_cmd;
