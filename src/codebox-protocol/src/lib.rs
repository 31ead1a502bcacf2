//! Codebox Protocol - Types exchanged between the executor and the sandbox harness.
//!
//! The harness runs inside the sandboxed child process and reports everything
//! the user program wrote through a single channel, its own stdout. This crate
//! defines that channel:
//!
//! - `stream` - the `<outStream>`/`<errStream>` tagging convention
//! - `record` - the final synchronous record and the hand-built fallback
//! - `frame` - JSON-line frames used in streaming mode
//! - `diagnostic` - compiler diagnostics forwarded to the caller
//! - `harness` - harness entry names and fixed messages

pub mod diagnostic;
pub mod frame;
pub mod harness;
pub mod record;
pub mod stream;

#[cfg(test)]
mod tests;

pub use diagnostic::{Diagnostic, Severity, TextSpan, has_errors};
pub use frame::{StreamFrame, StreamTranscript};
pub use harness::{HarnessEntry, NO_ENTRY_POINT_MESSAGE, exception_kind};
pub use record::{ExceptionDescriptor, RunOutput, fallback_record, fallback_record_with_causes};
pub use stream::{OutputStream, Segment, collapse_adjacent_tags, decode_segments, tag};
