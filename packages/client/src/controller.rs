//! Decoding loop and completion bookkeeping for one streaming task.

use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use status_core::{Frame, SseDecoder};
use ulid::Ulid;

use crate::error::ClientError;
use crate::event::StatusEvent;
use crate::notify::Notifier;

pub(crate) const PARSE_FAILED: &str = "Failed to parse server-sent event data";
pub(crate) const CONNECTION_FAILED: &str = "Server-sent event connection failed";

/// Client-side identifier for one streaming task. Never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(format!("sse-{}", Ulid::new().to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion callback that runs at most once, whoever gets there first.
pub(crate) struct FinishOnce {
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FinishOnce {
    pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Run the callback if nobody has yet. Returns whether this call ran it.
    pub fn fire(&self) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Why the decoding loop stopped.
#[derive(Debug)]
pub(crate) enum StreamEnd {
    /// The completion marker arrived.
    Done,
    /// The transport broke or ended early.
    Failed(ClientError),
}

/// Decode an event-stream body, handing each update to `on_message`.
///
/// A malformed message is reported and skipped; the stream stays open.
pub(crate) async fn drive<S, E, M>(stream: S, on_message: &mut M, notifier: &dyn Notifier) -> StreamEnd
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    M: FnMut(StatusEvent) + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return StreamEnd::Failed(ClientError::Transport(e.to_string())),
        };

        for frame in decoder.push(&chunk) {
            match frame {
                Frame::Done => return StreamEnd::Done,
                Frame::Update(json) => match StatusEvent::parse(&json) {
                    Ok(event) => {
                        tracing::debug!("(sse) {:?}", event);
                        on_message(event);
                    }
                    Err(e) => {
                        tracing::error!("Error parsing SSE data: {}", e);
                        notifier.error(PARSE_FAILED);
                    }
                },
            }
        }
    }

    if decoder.has_pending() {
        tracing::debug!("Stream ended in the middle of a message");
    }
    StreamEnd::Failed(ClientError::UnexpectedEof)
}
