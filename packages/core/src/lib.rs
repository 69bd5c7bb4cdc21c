//! Core domain types for the job status broadcast system.
//!
//! This crate contains shared types used across all packages:
//! - JobId and SubscriptionId for routing
//! - StatusUpdate for progress reports
//! - Frame and SseDecoder for the event-stream wire format

mod frame;
mod job;
mod update;

pub use frame::{DONE_SENTINEL, Frame, SseDecoder, is_done_marker};
pub use job::{JobId, SubscriptionId};
pub use update::{StatusUpdate, UpdateRequest};
