//! Message types for the dispatcher actor.

use status_core::{JobId, StatusUpdate};
use ractor::RpcReplyPort;

use crate::dispatcher::BroadcastStats;

/// Messages for the BroadcastActor.
#[derive(Debug)]
pub enum BroadcastMessage {
    /// Fan an update out to its subscribers.
    Publish { update: Box<StatusUpdate> },

    /// End the streams of one job (or of wildcard subscribers for `None`).
    Complete { job_id: Option<JobId> },

    /// Get running totals and registry occupancy.
    Stats { reply: RpcReplyPort<BroadcastStats> },
}
