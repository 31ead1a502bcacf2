//! Output capture.
//!
//! Both pump threads feed one [`OutputCapture`], which either accumulates
//! tagged text for the final record or emits one frame per write in
//! streaming mode. A single lock serializes the two streams, so the
//! interleaving the consumer sees is the order the harness read the bytes.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use codebox_protocol::{OutputStream, StreamFrame, collapse_adjacent_tags, tag};

const TRUNCATION_NOTICE: &str = "\n[output truncated]\n";

enum Target {
    Buffer(String),
    Frames(Box<dyn Write + Send>),
}

struct Inner {
    target: Target,
    written: usize,
    max_bytes: Option<usize>,
    truncated: bool,
}

impl Inner {
    fn emit(&mut self, stream: OutputStream, text: &str) -> io::Result<()> {
        match &mut self.target {
            Target::Buffer(buffer) => {
                buffer.push_str(&tag(stream, text));
                Ok(())
            }
            Target::Frames(writer) => {
                let line = StreamFrame::output(stream, text)
                    .to_line()
                    .map_err(io::Error::other)?;
                writer.write_all(line.as_bytes())?;
                writer.flush()
            }
        }
    }
}

/// Shared sink for everything the user program writes.
#[derive(Clone)]
pub struct OutputCapture {
    inner: Arc<Mutex<Inner>>,
}

impl OutputCapture {
    /// Accumulate tagged text; retrieve it with [`OutputCapture::finish`].
    pub fn buffered(max_bytes: Option<usize>) -> Self {
        Self::with_target(Target::Buffer(String::new()), max_bytes)
    }

    /// Write one JSON frame per captured chunk to `writer`.
    pub fn streaming(writer: Box<dyn Write + Send>, max_bytes: Option<usize>) -> Self {
        Self::with_target(Target::Frames(writer), max_bytes)
    }

    fn with_target(target: Target, max_bytes: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                target,
                written: 0,
                max_bytes,
                truncated: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A pump thread that panicked mid-write leaves nothing half-updated
        // that matters here.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `text` as written to `stream`.
    pub fn write(&self, stream: OutputStream, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        if inner.truncated {
            return Ok(());
        }

        let max_bytes = inner.max_bytes;
        let text = match max_bytes {
            Some(max) if inner.written + text.len() > max => {
                let mut keep = max.saturating_sub(inner.written);
                while !text.is_char_boundary(keep) {
                    keep -= 1;
                }
                inner.truncated = true;
                tracing::debug!("Output limit of {max} bytes reached");
                let kept = &text[..keep];
                if !kept.is_empty() {
                    inner.emit(stream, kept)?;
                }
                return inner.emit(OutputStream::Err, TRUNCATION_NOTICE);
            }
            _ => text,
        };

        inner.written += text.len();
        inner.emit(stream, text)
    }

    /// Whether output was dropped because of the size limit.
    pub fn truncated(&self) -> bool {
        self.lock().truncated
    }

    /// Write a frame that is not program output, e.g. the final exception.
    /// Only meaningful in streaming mode; buffered captures ignore it.
    pub fn write_frame(&self, frame: &StreamFrame) -> io::Result<()> {
        let mut inner = self.lock();
        match &mut inner.target {
            Target::Buffer(_) => Ok(()),
            Target::Frames(writer) => {
                let line = frame.to_line().map_err(io::Error::other)?;
                writer.write_all(line.as_bytes())?;
                writer.flush()
            }
        }
    }

    /// Finish capturing. Returns the collapsed tagged text in buffered mode
    /// and an empty string in streaming mode.
    pub fn finish(&self) -> io::Result<String> {
        let mut inner = self.lock();
        match &mut inner.target {
            Target::Buffer(buffer) => Ok(collapse_adjacent_tags(&std::mem::take(buffer))),
            Target::Frames(writer) => {
                writer.flush()?;
                Ok(String::new())
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Target::Frames(writer) = &mut self.target {
            let _ = writer.flush();
        }
    }
}

/// Decodes a byte stream into UTF-8 text chunk by chunk.
///
/// Multi-byte sequences split across reads are carried over to the next
/// chunk. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + bytes` as is complete.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left. An incomplete trailing sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}
