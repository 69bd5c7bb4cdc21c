//! Fan-out of status updates onto subscriber queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use status_core::{JobId, StatusUpdate};
use tokio::sync::mpsc::error::TrySendError;

use crate::error::BroadcastError;
use crate::registry::{RegistryStats, SubscriberRegistry};

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers the update was queued for.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers whose session had already gone away.
    pub stale: usize,
}

/// Running totals since the dispatcher started.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BroadcastStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub completed: u64,
    pub registry: RegistryStats,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
}

/// Pushes updates onto every matching subscription without ever waiting.
///
/// A full queue means a stalled consumer: the update is dropped for that
/// subscriber alone. The UI re-syncs to the latest state, so losing an
/// intermediate update is acceptable where stalling the producer is not.
pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `update` to its job's subscribers and to wildcard subscribers.
    pub fn publish(&self, update: &StatusUpdate) -> Result<DispatchReport, BroadcastError> {
        let json = update.to_json()?;
        let targets = self.registry.fanout(update.job_id());
        let mut report = DispatchReport::default();

        for target in targets {
            match target.sink.try_send(json.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Subscriber {} is not keeping up, dropping update for {}",
                        target.id,
                        update.description()
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    self.registry.remove(&target.key, target.id);
                    report.stale += 1;
                }
            }
        }

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        tracing::debug!(
            "Broadcast {} to {} subscriber(s) ({} dropped)",
            update.description(),
            report.delivered,
            report.dropped
        );
        Ok(report)
    }

    /// End the streams of every subscriber of `job_id`.
    ///
    /// Updates already queued are still delivered before the end of stream.
    /// `None` ends the wildcard subscribers only.
    pub fn complete(&self, job_id: Option<&JobId>) -> usize {
        let closed = self.registry.complete(job_id);
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        match job_id {
            Some(job) => tracing::info!("Job {} completed, closed {} stream(s)", job, closed),
            None => tracing::info!("Global completion, closed {} wildcard stream(s)", closed),
        }
        closed
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            registry: self.registry.stats(),
        }
    }
}
