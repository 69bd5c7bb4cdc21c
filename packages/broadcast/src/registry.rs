//! Subscriber registry mapping jobs to open stream sinks.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use status_core::{JobId, SubscriptionId};
use tokio::sync::mpsc;

/// Bucket a subscription lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Subscribers of one job.
    Job(JobId),
    /// Subscribers of every job.
    Wildcard,
}

impl BucketKey {
    pub fn for_job(job_id: Option<&JobId>) -> Self {
        match job_id {
            Some(job) => BucketKey::Job(job.clone()),
            None => BucketKey::Wildcard,
        }
    }
}

/// Sending half of a subscription's queue, held by the registry only.
pub(crate) type Sink = mpsc::Sender<Arc<str>>;

/// A registered stream's receiving end.
///
/// Owned by exactly one stream session. The registry keeps only the sending
/// half, so removing the subscription from the registry closes the queue once
/// any in-flight dispatch has finished with it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    key: BucketKey,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match &self.key {
            BucketKey::Job(job) => Some(job),
            BucketKey::Wildcard => None,
        }
    }

    /// Wait for the next serialized update.
    ///
    /// Returns `None` once the producer side is closed and every queued update
    /// has been received.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Take an already-queued update without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<str>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// A point-in-time delivery target produced by [`SubscriberRegistry::fanout`].
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub id: SubscriptionId,
    pub key: BucketKey,
    pub sink: Sink,
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Number of non-empty buckets.
    pub buckets: usize,
    /// Total live subscriptions.
    pub subscriptions: usize,
    /// Wildcard subscriptions.
    pub wildcard: usize,
    /// Subscriptions per job.
    pub jobs: BTreeMap<String, usize>,
}

/// Process-wide map from job to the subscriptions listening on it.
///
/// Constructed once at startup and shared through an `Arc`. A single mutex
/// serializes structural changes; every operation holds it only for map
/// manipulation, never across an await or a channel send.
pub struct SubscriberRegistry {
    buckets: Mutex<HashMap<BucketKey, HashMap<SubscriptionId, Sink>>>,
    capacity: usize,
}

impl SubscriberRegistry {
    /// Create an empty registry whose subscriptions queue up to `capacity`
    /// updates each.
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Per-subscription queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BucketKey, HashMap<SubscriptionId, Sink>>> {
        // Bucket maps are never left half-updated, so a poisoned lock is still usable.
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscription for `job_id`, or for every job when `None`.
    pub fn subscribe(&self, job_id: Option<JobId>) -> Subscription {
        let (sink, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::new();
        let key = match job_id {
            Some(job) => BucketKey::Job(job),
            None => BucketKey::Wildcard,
        };

        self.lock()
            .entry(key.clone())
            .or_default()
            .insert(id, sink);

        tracing::debug!("Subscription {} registered on {:?}", id, key);
        Subscription { id, key, receiver }
    }

    /// Remove a subscription. Calling this more than once is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.remove(&subscription.key, subscription.id)
    }

    /// Remove a subscription by bucket and id, pruning the bucket if it empties.
    pub fn remove(&self, key: &BucketKey, id: SubscriptionId) -> bool {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            return false;
        };
        let removed = bucket.remove(&id).is_some();
        if bucket.is_empty() {
            buckets.remove(key);
        }
        if removed {
            tracing::debug!("Subscription {} removed from {:?}", id, key);
        }
        removed
    }

    /// Snapshot the subscriptions an update for `job_id` should reach.
    ///
    /// A job-scoped update reaches that job's bucket plus the wildcard bucket;
    /// an unscoped update reaches everyone.
    pub(crate) fn fanout(&self, job_id: Option<&JobId>) -> Vec<Target> {
        let buckets = self.lock();
        let collect = |key: &BucketKey, bucket: &HashMap<SubscriptionId, Sink>| {
            bucket
                .iter()
                .map(|(id, sink)| Target {
                    id: *id,
                    key: key.clone(),
                    sink: sink.clone(),
                })
                .collect::<Vec<_>>()
        };

        match job_id {
            Some(job) => [BucketKey::Job(job.clone()), BucketKey::Wildcard]
                .iter()
                .filter_map(|key| buckets.get(key).map(|bucket| collect(key, bucket)))
                .flatten()
                .collect(),
            None => buckets
                .iter()
                .flat_map(|(key, bucket)| collect(key, bucket))
                .collect(),
        }
    }

    /// Detach the whole bucket for `job_id` and close its queues.
    ///
    /// Subscribers drain what is already queued and then observe the end of
    /// their stream. Other jobs and wildcard subscribers are unaffected by a
    /// job-scoped completion. Returns the number of subscriptions closed.
    pub fn complete(&self, job_id: Option<&JobId>) -> usize {
        let key = BucketKey::for_job(job_id);
        let detached = self.lock().remove(&key);
        let closed = detached.map_or(0, |bucket| bucket.len());
        tracing::debug!("Closed {} subscription(s) on {:?}", closed, key);
        closed
    }

    /// Detach every bucket, ending all streams. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let detached = std::mem::take(&mut *self.lock());
        detached.values().map(HashMap::len).sum()
    }

    /// Whether the subscription is still registered.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.lock().values().any(|bucket| bucket.contains_key(&id))
    }

    /// Number of subscriptions in one bucket.
    pub fn bucket_len(&self, job_id: Option<&JobId>) -> usize {
        self.lock()
            .get(&BucketKey::for_job(job_id))
            .map_or(0, HashMap::len)
    }

    /// Total number of live subscriptions.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let buckets = self.lock();
        let mut stats = RegistryStats {
            buckets: buckets.len(),
            ..Default::default()
        };
        for (key, bucket) in buckets.iter() {
            stats.subscriptions += bucket.len();
            match key {
                BucketKey::Job(job) => {
                    stats.jobs.insert(job.to_string(), bucket.len());
                }
                BucketKey::Wildcard => stats.wildcard = bucket.len(),
            }
        }
        stats
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(crate::BroadcastConfig::default().queue_capacity)
    }
}
