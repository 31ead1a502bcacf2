//! The `run` command.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use codebox_exec::{
    Compilation, ExecConfig, ExecutionOutcome, ExecutionResult, Executor, FrameWriter,
    StaticCompiler, load_artifact_dir,
};
use codebox_protocol::OutputStream;
use tokio::io::AsyncWrite;

/// How synchronous results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Program output on stdout/stderr, failures on stderr.
    #[default]
    Text,
    /// The full result as JSON.
    Json,
}

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Directory of compiled artifacts. Files with an executable bit are
    /// runnable.
    pub artifacts: PathBuf,

    /// Entry point, e.g. `demo.main` for `demo/main`.
    #[arg(long, short)]
    pub entry: Option<String>,

    /// Print JSON frames as output arrives instead of a single result.
    #[arg(long)]
    pub stream: bool,

    /// Output format for non-streaming runs.
    #[arg(long, value_enum, default_value_t = OutputFormat::default())]
    pub format: OutputFormat,

    /// Arguments passed to the program.
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl RunCommand {
    pub async fn run(self, config_path: Option<&Path>) -> Result<i32> {
        let config = ExecConfig::load(config_path)?;

        if self.stream {
            self.stream_to(&config, tokio::io::stdout()).await?;
            return Ok(0);
        }

        let result = self.execute(&config).await?;
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(0)
            }
            OutputFormat::Text => print_text(&result),
        }
    }

    /// Run the artifacts and return the aggregate result. Each argument
    /// reaches the program unchanged, whitespace included.
    pub async fn execute(&self, config: &ExecConfig) -> Result<ExecutionResult> {
        let (executor, compilation) = self.prepare(config)?;
        Ok(executor.run_compiled(compilation, &self.args).await?)
    }

    /// Run the artifacts, writing JSON frame lines to `writer`.
    pub async fn stream_to<W>(&self, config: &ExecConfig, writer: W) -> Result<W>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (executor, compilation) = self.prepare(config)?;
        let mut sink = FrameWriter::new(writer);
        executor
            .run_compiled_streaming(compilation, &self.args, &mut sink)
            .await?;
        Ok(sink.into_inner())
    }

    fn prepare(&self, config: &ExecConfig) -> Result<(Executor, Compilation)> {
        let artifacts = load_artifact_dir(&self.artifacts, self.entry.as_deref())
            .with_context(|| format!("Failed to load {}", self.artifacts.display()))?;
        tracing::debug!(files = artifacts.len(), entry = ?self.entry, "Artifacts loaded");

        // The artifacts are already built; the executor's compiler is never consulted.
        let executor = Executor::new(config, StaticCompiler::default())?;
        Ok((executor, Compilation::new(Vec::new(), Some(artifacts))))
    }
}

/// Print the program's output as it was written. Exit code 1 when the
/// program failed or did not run.
fn print_text(result: &ExecutionResult) -> Result<i32> {
    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();

    for diagnostic in &result.diagnostics {
        writeln!(
            stderr,
            "{:?}: {}: {}",
            diagnostic.severity, diagnostic.file, diagnostic.message
        )?;
    }

    match &result.outcome {
        ExecutionOutcome::NotRun => Ok(1),
        ExecutionOutcome::Restricted { message } => {
            writeln!(stderr, "{message}")?;
            Ok(1)
        }
        ExecutionOutcome::Completed(output) => {
            for segment in output.segments() {
                match segment.stream {
                    OutputStream::Out => stdout.write_all(segment.text.as_bytes())?,
                    OutputStream::Err => stderr.write_all(segment.text.as_bytes())?,
                }
            }
            stdout.flush()?;
            match &output.exception {
                Some(exception) => {
                    writeln!(stderr, "{exception}")?;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }
}
