//! Main entry point for the harness binary.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use codebox_protocol::{
    HarnessEntry, NO_ENTRY_POINT_MESSAGE, OutputStream, RunOutput, StreamFrame,
    fallback_record_with_causes,
};
use tracing_subscriber::EnvFilter;

use crate::capture::OutputCapture;
use crate::entry::{Resolution, resolve_entry_point};
use crate::error::{HarnessError, Result};
use crate::invoke::InvocationOutcome;
use crate::limits::ChildLimits;
use crate::policy::SecurityPolicy;

/// Environment variable holding the harness log filter.
const LOG_ENV: &str = "CODEBOX_HARNESS_LOG";

/// Positional arguments, in the order the executor passes them.
#[derive(Debug, Parser)]
#[command(name = "codebox-harness", about = "Run a user program inside the codebox sandbox")]
pub struct HarnessArgs {
    /// `run` for a single result record, `run-streaming` for JSON frames.
    pub entry: HarnessEntry,

    /// Rendered security policy file.
    pub policy: PathBuf,

    /// Address-space ceiling for the user program, in MiB. 0 disables it.
    pub memory_limit_mb: u64,

    /// Classpath roots joined with the platform path separator.
    pub classpath: OsString,

    /// Entry point followed by the program's arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,
}

impl HarnessArgs {
    pub fn classpath_roots(&self) -> Vec<PathBuf> {
        std::env::split_paths(&self.classpath)
            .filter(|p| !p.as_os_str().is_empty())
            .collect()
    }

    /// The requested entry point and its arguments, if any.
    pub fn user_entry(&self) -> Option<(&str, &[String])> {
        self.program
            .split_first()
            .map(|(entry, args)| (entry.as_str(), args))
    }
}

/// Run the harness and exit.
///
/// Always leaves something parseable on stdout: the normal output on
/// success, the fallback record otherwise.
pub fn run_main() -> ! {
    init_logging();
    install_panic_hook();

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            let causes = e.causes();
            tracing::error!(?causes, "Harness failed: {e}");
            emit_fallback(e.kind(), &e.to_string(), &causes);
            1
        }
        // The hook already printed the record.
        Err(_) => 1,
    };
    std::process::exit(code)
}

/// Report panics through the fallback record. Runs before unwinding, so it
/// also works in builds that abort on panic.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "harness panicked".to_string());
        let message = match info.location() {
            Some(l) => format!("{message} (at {}:{})", l.file(), l.line()),
            None => message,
        };
        eprintln!("codebox-harness panicked: {message}");
        emit_fallback("Panic", &message, &[]);
    }));
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn emit_fallback(kind: &str, message: &str, causes: &[String]) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", fallback_record_with_causes(kind, message, causes));
    let _ = stdout.flush();
}

fn run() -> Result<()> {
    let args = HarnessArgs::try_parse_from(std::env::args_os())
        .map_err(|e| HarnessError::InvalidArguments(e.to_string().trim().to_string()))?;
    tracing::debug!(?args, "Harness started");

    let policy = SecurityPolicy::load(&args.policy)?;
    policy.enforce()?;

    let max_output = policy.limits.max_output_bytes;
    let capture = match args.entry {
        HarnessEntry::Run => OutputCapture::buffered(max_output),
        HarnessEntry::Streaming => {
            OutputCapture::streaming(Box::new(std::io::stdout()), max_output)
        }
    };

    let limits = ChildLimits::new(args.memory_limit_mb, &policy.limits);
    let deadline = policy.limits.wall_clock_ms.map(Duration::from_millis);
    let outcome = invoke_entry(&args, &capture, limits, deadline)?;

    match args.entry {
        HarnessEntry::Run => {
            let mut output = RunOutput::new(capture.finish()?);
            output.exception = outcome.exception().cloned();
            let json = serde_json::to_string(&output)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
            stdout.flush()?;
        }
        HarnessEntry::Streaming => {
            if let Some(exception) = outcome.exception() {
                capture.write_frame(&StreamFrame::Exception(exception.clone()))?;
            }
            capture.finish()?;
        }
    }
    Ok(())
}

fn invoke_entry(
    args: &HarnessArgs,
    capture: &OutputCapture,
    limits: ChildLimits,
    deadline: Option<Duration>,
) -> Result<InvocationOutcome> {
    let Some((name, program_args)) = args.user_entry() else {
        report_missing_entry(capture)?;
        return Ok(InvocationOutcome::NotInvokable);
    };

    let outcome = match resolve_entry_point(&args.classpath_roots(), name) {
        Resolution::Found(program) => program.invoke(program_args, capture, limits, deadline)?,
        Resolution::NotFound => InvocationOutcome::NotInvokable,
        Resolution::NotInvokable { path } => {
            tracing::debug!("Entry point {} is not executable", path.display());
            InvocationOutcome::NotInvokable
        }
    };

    if outcome == InvocationOutcome::NotInvokable {
        report_missing_entry(capture)?;
    }
    Ok(outcome)
}

fn report_missing_entry(capture: &OutputCapture) -> Result<()> {
    capture.write(OutputStream::Err, &format!("{NO_ENTRY_POINT_MESSAGE}\n"))?;
    Ok(())
}
