//! Starting the harness and decoding what it reports.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use codebox_protocol::{ExceptionDescriptor, RunOutput, StreamFrame, exception_kind};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{ExecError, Result};
use crate::invocation::InvocationSpec;
use crate::sink::OutputSink;

/// Environment variables passed through to the harness.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "LANG", "CODEBOX_HARNESS_LOG"];

/// Runs one harness process per call.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the harness in synchronous mode and return its record.
    pub async fn run(&self, spec: &InvocationSpec) -> Result<RunOutput> {
        let mut child = self.spawn(spec)?;
        let mut stdout = child.stdout.take();

        let finished = tokio::time::timeout(self.timeout, async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut buf).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((buf, status))
        })
        .await;

        let (stdout, status) = match finished {
            Ok(result) => result?,
            Err(_) => {
                kill_tree(&mut child).await;
                warn!(session_id = %spec.session_id, "Run timed out");
                return Ok(RunOutput::default().with_exception(self.timeout_exception()));
            }
        };

        debug!(session_id = %spec.session_id, exit_code = ?status.code(), "Harness exited");
        let stdout = String::from_utf8_lossy(&stdout);
        Ok(RunOutput::from_harness_stdout(&stdout)
            .unwrap_or_else(|| RunOutput::default().with_exception(terminated_exception(status))))
    }

    /// Run the harness in streaming mode, forwarding every frame to `sink`
    /// as soon as it is decoded.
    pub async fn run_streaming<S>(&self, spec: &InvocationSpec, sink: &mut S) -> Result<()>
    where
        S: OutputSink + ?Sized,
    {
        let mut child = self.spawn(spec)?;
        let stdout = child.stdout.take();

        let finished = tokio::time::timeout(self.timeout, async {
            let mut relayed = 0usize;
            if let Some(out) = stdout {
                let mut lines = BufReader::new(out).lines();
                while let Some(line) = lines.next_line().await? {
                    for frame in StreamFrame::decode_line(&line) {
                        sink.send(frame).await?;
                        relayed += 1;
                    }
                }
            }
            let status = child.wait().await?;
            Ok::<_, ExecError>((relayed, status))
        })
        .await;

        match finished {
            Ok(Ok((relayed, status))) => {
                debug!(session_id = %spec.session_id, exit_code = ?status.code(), relayed, "Harness exited");
                // A silent program under a healthy harness relays nothing.
                if relayed == 0 && !status.success() {
                    sink.send(StreamFrame::Exception(terminated_exception(status)))
                        .await?;
                }
                Ok(())
            }
            Ok(Err(e)) => {
                kill_tree(&mut child).await;
                Err(e)
            }
            Err(_) => {
                kill_tree(&mut child).await;
                warn!(session_id = %spec.session_id, "Streaming run timed out");
                sink.send(StreamFrame::Exception(self.timeout_exception()))
                    .await
            }
        }
    }

    fn spawn(&self, spec: &InvocationSpec) -> Result<Child> {
        let mut cmd = Command::new(&spec.runtime);
        cmd.args(spec.to_args()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.env_clear();
        for key in PASSTHROUGH_ENV {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }

        // Own process group so a timeout can take down everything it started.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        debug!(
            session_id = %spec.session_id,
            entry = %spec.entry,
            runtime = %spec.runtime.display(),
            "Starting harness"
        );
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: spec.runtime.clone(),
            source,
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(stderr, spec.session_id.clone()));
        }
        Ok(child)
    }

    fn timeout_exception(&self) -> ExceptionDescriptor {
        ExceptionDescriptor::new(
            exception_kind::TIMEOUT,
            format!("Execution exceeded {} ms", self.timeout.as_millis()),
        )
    }
}

/// The harness's own log output goes to our log, never to the caller.
async fn relay_stderr(stderr: impl AsyncRead + Unpin, session_id: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(session_id = %session_id, "harness: {line}");
    }
}

fn terminated_exception(status: ExitStatus) -> ExceptionDescriptor {
    ExceptionDescriptor::new(
        exception_kind::PROCESS_TERMINATED,
        format!("Sandboxed process ended without a result ({status})"),
    )
}

async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    let _ = child.kill().await;
}
