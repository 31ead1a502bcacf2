//! Codebox Exec - Runs compiled user programs in a sandboxed child process.
//!
//! Each request gets its own session directory holding the compiled
//! artifacts and a security policy rendered for that session. The program is
//! never started directly: the `codebox-harness` binary is, which applies the
//! policy to itself and then runs the user's entry point, capturing its
//! output.
//!
//! # Example
//!
//! ```rust,ignore
//! use codebox_exec::{ExecConfig, Executor, Project, StaticCompiler};
//!
//! let config = ExecConfig::load(None)?;
//! let executor = Executor::new(&config, StaticCompiler::new(compilation))?;
//! let result = executor.run(Project::default()).await?;
//! ```

mod artifacts;
mod compiler;
mod config;
mod error;
mod executor;
mod invocation;
mod policy;
mod result;
mod runner;
mod session;
mod sink;


pub use artifacts::CompiledArtifactSet;
pub use compiler::{Compilation, Compiler, Project, StaticCompiler, load_artifact_dir};
pub use config::{
    CODEBOX_CONFIG_ENV, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIMEOUT_SECS, ExecConfig,
    find_config_file,
};
pub use error::{ExecError, Result};
pub use executor::Executor;
pub use invocation::{InvocationSpec, InvocationSpecBuilder, split_program_args};
pub use policy::{GENERATED_TOKEN, LIB_DIR_TOKEN, PolicyTemplate, RenderedPolicy, render_policy};
pub use result::{ExecutionOutcome, ExecutionResult, NO_ARTIFACTS_MESSAGE};
pub use runner::ProcessRunner;
pub use session::{SessionDirectory, SessionId, cleanup_stale};
pub use sink::{FrameWriter, OutputSink};

pub use codebox_protocol as protocol;
