//! Codebox sandbox harness.
//!
//! Runs inside the sandboxed process. The executor never starts user code
//! directly; it starts this harness, which:
//!
//! 1. applies the session's security policy to itself,
//! 2. captures everything the user program writes, tagged by stream,
//! 3. resolves and invokes the user's entry point,
//! 4. classifies how the program ended,
//! 5. reports the result on its own stdout.
//!
//! If anything goes wrong outside the user program, a minimal hand-built
//! record is printed instead so the executor always receives a parseable
//! payload.

#[cfg(unix)]
mod capture;
#[cfg(unix)]
mod entry;
mod error;
#[cfg(unix)]
mod invoke;
#[cfg(target_os = "linux")]
mod landlock;
#[cfg(unix)]
mod limits;
mod policy;
#[cfg(unix)]
mod run_main;
#[cfg(target_os = "linux")]
mod seccomp;

#[cfg(unix)]
pub use capture::{OutputCapture, Utf8Chunker};
#[cfg(unix)]
pub use entry::{Resolution, RunnableProgram, resolve_entry_point};
pub use error::{HarnessError, Result};
#[cfg(unix)]
pub use invoke::InvocationOutcome;
pub use policy::{Enforcement, FilesystemRules, NetworkRules, PolicyLimits, SecurityPolicy};
#[cfg(unix)]
pub use run_main::HarnessArgs;

/// Run the harness main function.
#[cfg(unix)]
pub fn run_main() -> ! {
    run_main::run_main()
}

#[cfg(not(unix))]
pub fn run_main() -> ! {
    print!(
        "{}",
        codebox_protocol::fallback_record(
            "UnsupportedPlatform",
            "codebox-harness is only supported on Unix"
        )
    );
    std::process::exit(1)
}
