//! Broadcast errors.

use thiserror::Error;

/// Errors surfaced by the broadcast handle.
///
/// Registry operations never fail; these only describe the dispatcher actor
/// being unavailable or an update that cannot be serialized.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Dispatcher is not running")]
    Stopped,
    #[error("Dispatcher did not reply in time")]
    Timeout,
    #[error("Failed to start dispatcher: {0}")]
    Spawn(#[from] ractor::SpawnErr),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
