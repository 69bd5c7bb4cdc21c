//! Text event-stream framing.
//!
//! Every stream message is `data: <payload>\n\n`. The payload is either a
//! serialized [`StatusUpdate`](crate::StatusUpdate) or the literal
//! [`DONE_SENTINEL`], which is the only place the sentinel string exists;
//! everything past this module works with [`Frame::Done`].

use std::sync::Arc;

/// Wire marker that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One message on a status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A serialized status update.
    Update(Arc<str>),
    /// No further updates will follow.
    Done,
}

impl Frame {
    /// Classify the data of a received message.
    pub fn from_data(data: &str) -> Self {
        if is_done_marker(data) {
            Frame::Done
        } else {
            Frame::Update(Arc::from(data))
        }
    }

    /// The payload carried in the `data:` field.
    pub fn data(&self) -> &str {
        match self {
            Frame::Update(json) => json,
            Frame::Done => DONE_SENTINEL,
        }
    }
}

/// Whether a raw payload is the end-of-stream marker.
pub fn is_done_marker(data: &str) -> bool {
    data.trim() == DONE_SENTINEL
}

/// Incremental decoder for a text event-stream.
///
/// Bytes may arrive split at arbitrary points, including inside a UTF-8
/// sequence; only complete lines are decoded. Comment lines (`:` prefix,
/// used for keep-alives) and fields other than `data` are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    let data = std::mem::take(&mut self.data).join("\n");
                    frames.push(Frame::from_data(&data));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        frames
    }

    /// Whether a partially received message is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty() || !self.data.is_empty()
    }
}
