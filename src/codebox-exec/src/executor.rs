//! The execution pipeline.
//!
//! compile → diagnostics gate → session → policy → artifacts → harness →
//! decode → session removed. The session is removed on every path, including
//! errors and cancellation: it is owned by a guard that deletes it on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use codebox_protocol::{HarnessEntry, StreamFrame, has_errors};
use tracing::{debug, info, warn};

use crate::artifacts::CompiledArtifactSet;
use crate::compiler::{Compilation, Compiler, Project};
use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::invocation::{InvocationSpec, InvocationSpecBuilder, split_program_args};
use crate::policy::PolicyTemplate;
use crate::result::{ExecutionResult, NO_ARTIFACTS_MESSAGE};
use crate::runner::ProcessRunner;
use crate::session::SessionDirectory;
use crate::sink::OutputSink;

/// Runs user projects in the sandbox. Cheap to share between tasks; every
/// call owns its own session and child process.
#[derive(Clone)]
pub struct Executor {
    compiler: Arc<dyn Compiler>,
    template: PolicyTemplate,
    library_dir: PathBuf,
    session_root: PathBuf,
    builder: InvocationSpecBuilder,
    runner: ProcessRunner,
}

impl Executor {
    /// Build from configuration, loading the policy template from disk.
    pub fn new(config: &ExecConfig, compiler: impl Compiler + 'static) -> Result<Self> {
        config.validate()?;
        let template = PolicyTemplate::load(&config.policy_template)?;
        Ok(Self::with_template(config, template, compiler))
    }

    pub fn with_template(
        config: &ExecConfig,
        template: PolicyTemplate,
        compiler: impl Compiler + 'static,
    ) -> Self {
        Self {
            compiler: Arc::new(compiler),
            template,
            library_dir: config.library_dir.clone(),
            session_root: config.session_root(),
            builder: InvocationSpecBuilder::new(
                config.runtime.clone(),
                config.classpath(),
                config.memory_limit_mb,
            ),
            runner: ProcessRunner::new(config.timeout()),
        }
    }

    pub fn session_root(&self) -> &Path {
        &self.session_root
    }

    /// Compile and run a project, returning the aggregate result.
    pub async fn run(&self, project: Project) -> Result<ExecutionResult> {
        let args = split_program_args(&project.args);
        let compilation = self.compile(project).await?;
        self.run_compiled(compilation, &args).await
    }

    /// Compile and run a project, streaming frames to `sink`. The first frame
    /// always carries the diagnostics.
    pub async fn run_streaming<S>(&self, project: Project, sink: &mut S) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        let args = split_program_args(&project.args);
        let compilation = self.compile(project).await?;
        self.run_compiled_streaming(compilation, &args, sink).await
    }

    /// Run an already compiled project.
    pub async fn run_compiled(
        &self,
        compilation: Compilation,
        args: &[String],
    ) -> Result<ExecutionResult> {
        let Compilation {
            diagnostics,
            artifacts,
        } = compilation;

        if has_errors(&diagnostics) {
            debug!(count = diagnostics.len(), "Compilation failed, not running");
            return Ok(ExecutionResult::not_run(diagnostics));
        }
        let Some(artifacts) = artifacts.filter(|a| !a.is_empty()) else {
            return Ok(ExecutionResult::restricted(diagnostics, NO_ARTIFACTS_MESSAGE));
        };

        let (session, spec) = self.prepare(&artifacts, HarnessEntry::Run, args)?;
        let output = self.runner.run(&spec).await;
        finish_session(session);

        let output = output?;
        info!(
            session_id = %spec.session_id,
            failed = output.exception.is_some(),
            "Run completed"
        );
        Ok(ExecutionResult::completed(diagnostics, output))
    }

    /// Streaming counterpart of [`Executor::run_compiled`].
    pub async fn run_compiled_streaming<S>(
        &self,
        compilation: Compilation,
        args: &[String],
        sink: &mut S,
    ) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        let Compilation {
            diagnostics,
            artifacts,
        } = compilation;

        let gated = has_errors(&diagnostics);
        sink.send(StreamFrame::Diagnostics(diagnostics)).await?;
        if gated {
            return Ok(());
        }
        let Some(artifacts) = artifacts.filter(|a| !a.is_empty()) else {
            return sink
                .send(StreamFrame::ErrStream(format!("{NO_ARTIFACTS_MESSAGE}\n")))
                .await;
        };

        let (session, spec) = self.prepare(&artifacts, HarnessEntry::Streaming, args)?;
        let relayed = self.runner.run_streaming(&spec, sink).await;
        finish_session(session);

        if relayed.is_ok() {
            info!(session_id = %spec.session_id, "Streaming run completed");
        }
        relayed
    }

    async fn compile(&self, project: Project) -> Result<Compilation> {
        let compiler = Arc::clone(&self.compiler);
        tokio::task::spawn_blocking(move || compiler.compile(&project)).await?
    }

    /// Create the session and everything the harness needs inside it.
    ///
    /// On error the session guard is dropped here, which removes the
    /// directory.
    fn prepare(
        &self,
        artifacts: &CompiledArtifactSet,
        entry: HarnessEntry,
        args: &[String],
    ) -> Result<(SessionDirectory, InvocationSpec)> {
        let policy_name = Path::new(self.template.file_name());
        if let Some((path, _)) = artifacts.files().find(|(path, _)| *path == policy_name) {
            return Err(ExecError::InvalidArtifactPath(path.to_path_buf()));
        }

        let session = SessionDirectory::create(&self.session_root)?;
        let rendered = self.template.render(&session, &self.library_dir);
        let policy_path = session.write_policy(&rendered, self.template.file_name())?;
        session.write_artifacts(artifacts)?;

        let spec = self.builder.build(
            entry,
            &session,
            &policy_path,
            artifacts.entry_point(),
            args,
        );
        debug!(
            session_id = %session.id(),
            entry = ?spec.user_entry,
            args = spec.user_args.len(),
            "Session prepared"
        );
        Ok((session, spec))
    }
}

fn finish_session(session: SessionDirectory) {
    let id = session.id().clone();
    if let Err(e) = session.destroy() {
        warn!(session_id = %id, "Failed to remove session directory: {e}");
    }
}
