//! Sandbox harness binary.
//!
//! Started by the executor as the sandboxed process. Applies the rendered
//! security policy, runs the user's entry point and prints its captured output
//! on stdout, either as one record or as a stream of frames.
//!
//! Usage:
//!   codebox-harness run /tmp/<session>/codebox.policy.toml 32 \
//!                   /srv/lib:/srv/tmp/<session> hello.Main arg1 arg2

fn main() -> ! {
    codebox_harness::run_main()
}
