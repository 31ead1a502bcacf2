//! Starting the user program and classifying how it ended.

use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use codebox_protocol::{ExceptionDescriptor, OutputStream, exception_kind};

use crate::capture::{OutputCapture, Utf8Chunker};
use crate::entry::RunnableProgram;
use crate::error::{HarnessError, Result};
use crate::limits::ChildLimits;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READ_BUFFER_SIZE: usize = 8192;
const SPAWN_RETRIES: u32 = 5;
const MINIMAL_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// How the user program ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed,
    /// The program exists but the OS refused to execute it.
    NotInvokable,
    Failed { cause: ExceptionDescriptor },
}

impl InvocationOutcome {
    pub fn exception(&self) -> Option<&ExceptionDescriptor> {
        match self {
            Self::Failed { cause } => Some(cause),
            Self::Completed | Self::NotInvokable => None,
        }
    }
}

impl RunnableProgram {
    /// Run the program to completion, feeding its output into `capture`.
    pub fn invoke(
        &self,
        args: &[String],
        capture: &OutputCapture,
        limits: ChildLimits,
        deadline: Option<Duration>,
    ) -> Result<InvocationOutcome> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .current_dir(&self.root)
            .env_clear()
            .env("PATH", MINIMAL_PATH)
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        unsafe {
            cmd.pre_exec(move || limits.apply_in_child());
        }

        let mut child = match spawn_retrying_busy(&mut cmd) {
            Ok(child) => child,
            Err(e) if is_not_invokable(&e) => {
                tracing::debug!("Cannot execute {}: {e}", self.path.display());
                return Ok(InvocationOutcome::NotInvokable);
            }
            Err(source) => {
                return Err(HarnessError::Spawn {
                    program: self.path.clone(),
                    source,
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pumps = [
            stdout.map(|s| spawn_pump(Pipe::Out(s), capture.clone())),
            stderr.map(|s| spawn_pump(Pipe::Err(s), capture.clone())),
        ];

        let waited = wait_with_deadline(&mut child, deadline);

        for pump in pumps.into_iter().flatten() {
            match pump.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Output pump failed: {e}"),
                Err(_) => tracing::warn!("Output pump panicked"),
            }
        }

        Ok(match waited? {
            Waited::Exited(status) => classify(status),
            Waited::TimedOut(limit) => InvocationOutcome::Failed {
                cause: ExceptionDescriptor::new(
                    exception_kind::TIMEOUT,
                    format!("Execution exceeded {} ms", limit.as_millis()),
                ),
            },
        })
    }
}

/// Spawn, retrying briefly while the executable is still open for writing
/// somewhere (ETXTBSY).
fn spawn_retrying_busy(cmd: &mut Command) -> io::Result<Child> {
    let mut attempts = 0;
    loop {
        match cmd.spawn() {
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempts < SPAWN_RETRIES => {
                attempts += 1;
                thread::sleep(POLL_INTERVAL * attempts);
            }
            result => return result,
        }
    }
}

fn is_not_invokable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
    ) || e.raw_os_error() == Some(libc::ENOEXEC)
}

enum Pipe {
    Out(ChildStdout),
    Err(ChildStderr),
}

fn spawn_pump(pipe: Pipe, capture: OutputCapture) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || match pipe {
        Pipe::Out(reader) => pump(reader, OutputStream::Out, &capture),
        Pipe::Err(reader) => pump(reader, OutputStream::Err, &capture),
    })
}

fn pump(mut reader: impl Read, stream: OutputStream, capture: &OutputCapture) -> io::Result<()> {
    let mut chunker = Utf8Chunker::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        capture.write(stream, &chunker.push(&buf[..n]))?;
    }
    capture.write(stream, &chunker.finish())
}

enum Waited {
    Exited(ExitStatus),
    TimedOut(Duration),
}

fn wait_with_deadline(child: &mut Child, deadline: Option<Duration>) -> Result<Waited> {
    let Some(limit) = deadline else {
        return Ok(Waited::Exited(child.wait()?));
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        if started.elapsed() >= limit {
            kill_process_group(child);
            // Reap so the pipes close and the pumps can finish.
            let _ = child.wait();
            return Ok(Waited::TimedOut(limit));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_process_group(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // The child called setpgid(0, 0), so its pid is also its group id.
    if unsafe { libc::kill(-pid, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
}

fn classify(status: ExitStatus) -> InvocationOutcome {
    if status.success() {
        return InvocationOutcome::Completed;
    }
    let cause = match (status.code(), status.signal()) {
        (Some(code), _) => ExceptionDescriptor::new(
            exception_kind::EXIT_STATUS,
            format!("exited with status {code}"),
        ),
        (None, Some(signal)) => {
            ExceptionDescriptor::new(exception_kind::SIGNAL, signal_message(signal))
        }
        (None, None) => ExceptionDescriptor::new(
            exception_kind::PROCESS_TERMINATED,
            "terminated without an exit status",
        ),
    };
    InvocationOutcome::Failed { cause }
}

fn signal_message(signal: i32) -> String {
    let name = match signal {
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        libc::SIGXCPU => "SIGXCPU",
        libc::SIGXFSZ => "SIGXFSZ",
        libc::SIGTERM => "SIGTERM",
        libc::SIGSYS => "SIGSYS",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        _ => return format!("killed by signal {signal}"),
    };
    format!("killed by signal {signal} ({name})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(dir: &Path, name: &str, body: &str) -> RunnableProgram {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        RunnableProgram {
            path,
            root: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "main", "echo \"hello $1\"");
        let capture = OutputCapture::buffered(None);

        let outcome = program
            .invoke(&["world".to_string()], &capture, ChildLimits::default(), None)
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::Completed);
        assert_eq!(
            capture.finish().unwrap(),
            "<outStream>hello world\n</outStream>"
        );
    }

    #[test]
    fn test_nonzero_exit_is_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "main", "echo oops >&2\nexit 3");
        let capture = OutputCapture::buffered(None);

        let outcome = program
            .invoke(&[], &capture, ChildLimits::default(), None)
            .unwrap();
        let cause = outcome.exception().unwrap();
        assert_eq!(cause.kind, exception_kind::EXIT_STATUS);
        assert_eq!(cause.message, "exited with status 3");
        assert_eq!(capture.finish().unwrap(), "<errStream>oops\n</errStream>");
    }

    #[test]
    fn test_deadline_kills_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "main", "sleep 30");
        let capture = OutputCapture::buffered(None);

        let started = Instant::now();
        let outcome = program
            .invoke(
                &[],
                &capture,
                ChildLimits::default(),
                Some(Duration::from_millis(200)),
            )
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.exception().unwrap().kind, exception_kind::TIMEOUT);
    }

    #[test]
    fn test_signal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "main", "kill -9 $$");
        let capture = OutputCapture::buffered(None);

        let outcome = program
            .invoke(&[], &capture, ChildLimits::default(), None)
            .unwrap();
        let cause = outcome.exception().unwrap();
        assert_eq!(cause.kind, exception_kind::SIGNAL);
        assert!(cause.message.contains("SIGKILL"));
    }
}
