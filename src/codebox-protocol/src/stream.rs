//! Output stream tagging.
//!
//! Every piece of text the user program writes is wrapped in a tag naming the
//! channel it was written to, so a single byte sequence can carry both
//! channels without losing their relative order:
//!
//! ```text
//! <outStream>1</outStream><errStream>A</errStream><outStream>2</outStream>
//! ```
//!
//! Consecutive writes to the same channel produce `</outStream><outStream>`
//! boundaries which carry no information; [`collapse_adjacent_tags`] removes
//! them.

use serde::{Deserialize, Serialize};

pub const OUT_STREAM_START: &str = "<outStream>";
pub const OUT_STREAM_END: &str = "</outStream>";
pub const ERR_STREAM_START: &str = "<errStream>";
pub const ERR_STREAM_END: &str = "</errStream>";

/// The channel a piece of output was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Out,
    Err,
}

impl OutputStream {
    pub fn start_tag(self) -> &'static str {
        match self {
            Self::Out => OUT_STREAM_START,
            Self::Err => ERR_STREAM_START,
        }
    }

    pub fn end_tag(self) -> &'static str {
        match self {
            Self::Out => OUT_STREAM_END,
            Self::Err => ERR_STREAM_END,
        }
    }

    /// The `</x><x>` boundary left between two writes to the same stream.
    fn redundant_boundary(self) -> &'static str {
        match self {
            Self::Out => "</outStream><outStream>",
            Self::Err => "</errStream><errStream>",
        }
    }
}

/// Wrap `text` in the tags of `stream`.
pub fn tag(stream: OutputStream, text: &str) -> String {
    let mut tagged =
        String::with_capacity(stream.start_tag().len() + text.len() + stream.end_tag().len());
    tagged.push_str(stream.start_tag());
    tagged.push_str(text);
    tagged.push_str(stream.end_tag());
    tagged
}

/// Remove every end tag immediately followed by a start tag of the same stream.
///
/// Runs to a fixed point, so applying it to its own output changes nothing.
pub fn collapse_adjacent_tags(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = current
            .replace(OutputStream::Err.redundant_boundary(), "")
            .replace(OutputStream::Out.redundant_boundary(), "");
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

/// A run of text written to one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub stream: OutputStream,
    pub text: String,
}

impl Segment {
    pub fn new(stream: OutputStream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }
}

/// Split tagged text back into per-stream segments.
///
/// The parser is lenient: text outside any tag is attributed to the out
/// stream, a start tag without a matching end tag runs to the end of the
/// input, and stray end tags are dropped. Neighbouring segments of the same
/// stream are merged and empty segments are skipped.
pub fn decode_segments(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        match next_start_tag(rest) {
            Some((index, stream)) => {
                push_untagged(&mut segments, &rest[..index]);
                let body = &rest[index + stream.start_tag().len()..];
                match body.find(stream.end_tag()) {
                    Some(end) => {
                        push_segment(&mut segments, stream, &body[..end]);
                        rest = &body[end + stream.end_tag().len()..];
                    }
                    None => {
                        push_segment(&mut segments, stream, body);
                        rest = "";
                    }
                }
            }
            None => {
                push_untagged(&mut segments, rest);
                rest = "";
            }
        }
    }

    segments
}

fn next_start_tag(text: &str) -> Option<(usize, OutputStream)> {
    let out = text.find(OUT_STREAM_START).map(|i| (i, OutputStream::Out));
    let err = text.find(ERR_STREAM_START).map(|i| (i, OutputStream::Err));
    match (out, err) {
        (Some(o), Some(e)) => Some(if o.0 < e.0 { o } else { e }),
        (found, None) | (None, found) => found,
    }
}

fn push_untagged(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    let cleaned = text.replace(OUT_STREAM_END, "").replace(ERR_STREAM_END, "");
    push_segment(segments, OutputStream::Out, &cleaned);
}

fn push_segment(segments: &mut Vec<Segment>, stream: OutputStream, text: &str) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(last) if last.stream == stream => last.text.push_str(text),
        _ => segments.push(Segment::new(stream, text)),
    }
}
