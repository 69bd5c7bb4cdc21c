//! Consumer side of the job status stream.
//!
//! [`StreamClient::create_task`] opens one event stream, hands every decoded
//! update to a callback and calls a completion callback exactly once, whether
//! the stream ends with the `[DONE]` marker, fails, or is cancelled.

mod client;
mod controller;
mod error;
mod event;
mod notify;

pub use client::{ClientConfig, StreamClient, TaskHandle};
pub use controller::TaskId;
pub use error::ClientError;
pub use event::StatusEvent;
pub use notify::{LogNotifier, Notifier};
