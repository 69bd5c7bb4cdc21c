//! Real-time status streaming via Server-Sent Events.

use std::convert::Infallible;
use std::future::Future;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use broadcast::{BroadcastStats, StreamSession, Transport, TransportError};
use status_core::Frame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::ingress::JobQuery;
use crate::init::AppState;

/// Events buffered between a session and the HTTP body.
const BODY_BUFFER: usize = 16;

/// Transport that feeds an SSE response body.
///
/// The body stream owns the receiving half; when the client goes away the
/// server drops the body, which `closed()` observes.
pub struct SseTransport {
    tx: mpsc::Sender<Result<Event, Infallible>>,
}

impl SseTransport {
    /// Create a transport and the event stream to hand to [`Sse`].
    pub fn channel() -> (Self, ReceiverStream<Result<Event, Infallible>>) {
        let (tx, rx) = mpsc::channel(BODY_BUFFER);
        (Self { tx }, ReceiverStream::new(rx))
    }
}

impl Transport for SseTransport {
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), TransportError>> + Send {
        let event = Event::default().data(frame.data());
        async move {
            self.tx
                .send(Ok(event))
                .await
                .map_err(|_| TransportError::Disconnected)
        }
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        self.tx.closed()
    }
}

/// `GET /api/status-stream`
///
/// Streams `data: <json>` messages for one job (or all jobs without a
/// `job_id`) and a final `data: [DONE]` when the job completes.
pub async fn status_stream(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let session = StreamSession::open(state.broadcaster.registry().clone(), query.job_id())
        .with_greeting(state.config.send_greeting);
    let (transport, body) = SseTransport::channel();

    tokio::spawn(async move {
        let outcome = session.run(transport).await;
        tracing::debug!(
            "Stream session {} finished {} ({} update(s))",
            outcome.id,
            outcome.state,
            outcome.delivered
        );
    });

    Sse::new(body).keep_alive(KeepAlive::new().interval(state.config.keep_alive))
}

/// `GET /api/status-stats`
pub async fn status_stats(State(state): State<AppState>) -> Result<Json<BroadcastStats>, ApiError> {
    Ok(Json(state.broadcaster.stats().await?))
}
