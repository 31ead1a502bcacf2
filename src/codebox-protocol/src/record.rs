//! Result records written by the harness in synchronous mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stream::{ERR_STREAM_END, ERR_STREAM_START, OutputStream, Segment, decode_segments, tag};

/// Why the user program did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDescriptor {
    /// Kind of failure, e.g. `ExitStatus`, `Signal`, `Timeout`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Underlying failure, if one was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ExceptionDescriptor>>,
}

impl ExceptionDescriptor {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ExceptionDescriptor) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for ExceptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The record the harness prints once the user program has finished.
///
/// `text` holds the tagged output with redundant boundaries already collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionDescriptor>,
}

impl RunOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exception: None,
        }
    }

    pub fn with_exception(mut self, exception: ExceptionDescriptor) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Parse what the harness printed on its stdout.
    ///
    /// A well-formed record is returned as-is. Any other non-empty payload is
    /// kept as error-stream text so the caller still sees it. Returns `None`
    /// when the payload is empty.
    pub fn from_harness_stdout(stdout: &str) -> Option<Self> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<RunOutput>(trimmed) {
            Ok(output) => Some(output),
            Err(_) => Some(RunOutput::new(tag(OutputStream::Err, stdout))),
        }
    }

    /// The captured text split back into per-stream segments.
    pub fn segments(&self) -> Vec<Segment> {
        decode_segments(&self.text)
    }

    /// Everything written to one stream, in order.
    pub fn stream_text(&self, stream: OutputStream) -> String {
        self.segments()
            .into_iter()
            .filter(|s| s.stream == stream)
            .map(|s| s.text)
            .collect()
    }
}

/// Assemble the minimal record used when normal serialization is not possible.
///
/// Built by hand, without serde, so that it can be produced whatever state the
/// harness is in. The result is always a valid `RunOutput` JSON object whose
/// text is a single error-stream segment.
pub fn fallback_record(kind: &str, message: &str) -> String {
    fallback_record_with_causes::<&str>(kind, message, &[])
}

/// [`fallback_record`] followed by one `Caused by:` line per underlying
/// error, outermost first.
pub fn fallback_record_with_causes<S: AsRef<str>>(
    kind: &str,
    message: &str,
    causes: &[S],
) -> String {
    let mut record = String::with_capacity(kind.len() + message.len() + 48);
    record.push_str("{\"text\":\"");
    push_json_escaped(&mut record, ERR_STREAM_START);
    push_json_escaped(&mut record, kind);
    record.push_str(": ");
    push_json_escaped(&mut record, message);
    for cause in causes {
        push_json_escaped(&mut record, "\nCaused by: ");
        push_json_escaped(&mut record, cause.as_ref());
    }
    push_json_escaped(&mut record, ERR_STREAM_END);
    record.push_str("\"}");
    record
}

fn push_json_escaped(buf: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if (c as u32) < 0x20 => buf.push_str(&format!("\\u{:04x}", c as u32)),
            c => buf.push(c),
        }
    }
}
