//! Streaming frames.
//!
//! In streaming mode the harness does not wait for the program to finish.
//! Each captured write becomes one JSON object on its own line:
//!
//! ```text
//! {"outStream":"hello\n"}
//! {"errStream":"oops\n"}
//! {"exception":{"type":"ExitStatus","message":"exited with status 1"}}
//! ```
//!
//! The executor relays the frames to the caller in the order they arrive and
//! may prepend a `diagnostics` frame of its own.

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::record::{ExceptionDescriptor, RunOutput};
use crate::stream::{OutputStream, Segment, collapse_adjacent_tags, tag};

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamFrame {
    OutStream(String),
    ErrStream(String),
    Exception(ExceptionDescriptor),
    Diagnostics(Vec<Diagnostic>),
}

impl StreamFrame {
    pub fn output(stream: OutputStream, text: impl Into<String>) -> Self {
        match stream {
            OutputStream::Out => Self::OutStream(text.into()),
            OutputStream::Err => Self::ErrStream(text.into()),
        }
    }

    /// The stream and text of an output frame.
    pub fn as_output(&self) -> Option<(OutputStream, &str)> {
        match self {
            Self::OutStream(text) => Some((OutputStream::Out, text)),
            Self::ErrStream(text) => Some((OutputStream::Err, text)),
            Self::Exception(_) | Self::Diagnostics(_) => None,
        }
    }

    /// Output frames rendered back into the tagged form used by synchronous mode.
    pub fn tagged_text(&self) -> Option<String> {
        self.as_output().map(|(stream, text)| tag(stream, text))
    }

    /// Serialize as a single newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one line received from the harness.
    ///
    /// Besides regular frames this accepts a whole `RunOutput` record (what the
    /// harness prints when it falls back to its minimal error record), which is
    /// split into output frames. Anything else is passed on as error-stream
    /// text. Blank lines decode to nothing.
    pub fn decode_line(line: &str) -> Vec<StreamFrame> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.trim().is_empty() {
            return Vec::new();
        }
        if let Ok(frame) = serde_json::from_str::<StreamFrame>(trimmed) {
            return vec![frame];
        }
        if let Ok(record) = serde_json::from_str::<RunOutput>(trimmed) {
            let mut frames: Vec<StreamFrame> = record
                .segments()
                .into_iter()
                .map(StreamFrame::from)
                .collect();
            if let Some(exception) = record.exception {
                frames.push(StreamFrame::Exception(exception));
            }
            return frames;
        }
        vec![StreamFrame::ErrStream(format!("{trimmed}\n"))]
    }
}

impl From<Segment> for StreamFrame {
    fn from(segment: Segment) -> Self {
        Self::output(segment.stream, segment.text)
    }
}

/// Accumulates relayed frames into the equivalent synchronous result.
#[derive(Debug, Clone, Default)]
pub struct StreamTranscript {
    tagged: String,
    exception: Option<ExceptionDescriptor>,
    diagnostics: Vec<Diagnostic>,
}

impl StreamTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: &StreamFrame) {
        match frame {
            StreamFrame::OutStream(_) | StreamFrame::ErrStream(_) => {
                if let Some(tagged) = frame.tagged_text() {
                    self.tagged.push_str(&tagged);
                }
            }
            StreamFrame::Exception(exception) => self.exception = Some(exception.clone()),
            StreamFrame::Diagnostics(diagnostics) => {
                self.diagnostics.extend(diagnostics.iter().cloned())
            }
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_run_output(self) -> RunOutput {
        RunOutput {
            text: collapse_adjacent_tags(&self.tagged),
            exception: self.exception,
        }
    }
}

impl<'a> FromIterator<&'a StreamFrame> for StreamTranscript {
    fn from_iter<I: IntoIterator<Item = &'a StreamFrame>>(iter: I) -> Self {
        let mut transcript = Self::new();
        for frame in iter {
            transcript.push(frame);
        }
        transcript
    }
}
