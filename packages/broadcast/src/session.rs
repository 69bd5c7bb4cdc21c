//! Stream sessions: one per client connection.
//!
//! A session owns one [`Subscription`] and relays whatever the dispatcher
//! queues on it to an outbound [`Transport`]:
//!
//! ```text
//! Open ──(queue closed)──> Draining ──(final [DONE] written)──> Closed
//!   └──(write failed / peer gone)──> Aborted
//! ```
//!
//! Both terminal transitions deregister the subscription before the transport
//! is released, and a session dropped mid-flight deregisters itself as well.

use std::future::Future;
use std::sync::Arc;

use status_core::{Frame, JobId, StatusUpdate, SubscriptionId};
use thiserror::Error;

use crate::registry::{SubscriberRegistry, Subscription};

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Write failed: {0}")]
    Write(String),
}

/// Outbound half of one client connection.
pub trait Transport: Send + Sync {
    /// Write one frame.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolve once the peer has gone away.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Draining,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub id: SubscriptionId,
    /// Either `Closed` or `Aborted`.
    pub state: SessionState,
    /// Updates written to the transport, not counting the greeting.
    pub delivered: usize,
}

/// Bridges one subscription to one transport.
pub struct StreamSession {
    subscription: Subscription,
    registry: Arc<SubscriberRegistry>,
    state: SessionState,
    greeting: bool,
}

impl StreamSession {
    /// Subscribe to `job_id` (or every job) and return the open session.
    pub fn open(registry: Arc<SubscriberRegistry>, job_id: Option<JobId>) -> Self {
        let subscription = registry.subscribe(job_id);
        tracing::info!(
            "Stream session {} opened for {}",
            subscription.id(),
            subscription
                .job_id()
                .map_or_else(|| "all jobs".to_string(), |job| format!("job {}", job))
        );
        Self {
            subscription,
            registry,
            state: SessionState::Open,
            greeting: false,
        }
    }

    /// Write a `connected` update before relaying anything else.
    pub fn with_greeting(mut self, greeting: bool) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.subscription.job_id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Relay updates until the stream completes or the peer goes away.
    pub async fn run<T: Transport>(mut self, mut transport: T) -> SessionOutcome {
        let mut delivered = 0;

        if self.greeting
            && let Some(frame) = self.greeting_frame()
            && let Err(e) = transport.send(frame).await
        {
            return self.abort(transport, delivered, e);
        }

        loop {
            tokio::select! {
                biased;

                _ = transport.closed() => {
                    return self.abort(transport, delivered, TransportError::Disconnected);
                }

                item = self.subscription.recv() => match item {
                    Some(json) => {
                        if let Err(e) = transport.send(Frame::Update(json)).await {
                            return self.abort(transport, delivered, e);
                        }
                        delivered += 1;
                    }
                    None => break,
                },
            }
        }

        // The queue only reports closed once it is empty, so everything the
        // dispatcher accepted has been written by now.
        self.state = SessionState::Draining;
        if let Err(e) = transport.send(Frame::Done).await {
            return self.abort(transport, delivered, e);
        }

        self.finish(SessionState::Closed);
        drop(transport);
        tracing::info!(
            "Stream session {} closed after {} update(s)",
            self.id(),
            delivered
        );
        self.outcome(delivered)
    }

    fn greeting_frame(&self) -> Option<Frame> {
        match StatusUpdate::connected(self.job_id()).to_json() {
            Ok(json) => Some(Frame::Update(json)),
            Err(e) => {
                tracing::warn!("Failed to encode greeting: {}", e);
                None
            }
        }
    }

    fn abort<T: Transport>(
        &mut self,
        transport: T,
        delivered: usize,
        reason: TransportError,
    ) -> SessionOutcome {
        self.finish(SessionState::Aborted);
        drop(transport);
        tracing::info!(
            "Stream session {} aborted after {} update(s): {}",
            self.id(),
            delivered,
            reason
        );
        self.outcome(delivered)
    }

    fn finish(&mut self, state: SessionState) {
        self.registry.unsubscribe(&self.subscription);
        self.state = state;
    }

    fn outcome(&self, delivered: usize) -> SessionOutcome {
        SessionOutcome {
            id: self.id(),
            state: self.state,
            delivered,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.registry.unsubscribe(&self.subscription);
            tracing::debug!("Stream session {} dropped while {}", self.id(), self.state);
        }
    }
}
