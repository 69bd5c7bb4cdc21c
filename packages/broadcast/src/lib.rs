//! Job status broadcast layer.
//!
//! This crate routes status updates from job producers to the stream
//! sessions that are interested in them.
//!
//! # Architecture
//!
//! - `SubscriberRegistry` - Map from job id (plus a wildcard bucket) to open sinks
//! - `Dispatcher` - Non-blocking fan-out of one update onto matching sinks
//! - `BroadcastActor` - Serializes publishes so producers never wait
//! - `StreamSession` - Relays one subscription to one client transport
//!
//! # Usage
//!
//! ```ignore
//! use broadcast::{BroadcastConfig, Broadcaster, StreamSession};
//!
//! let (broadcaster, _handle) = Broadcaster::start(BroadcastConfig::default()).await?;
//!
//! // Per connection
//! let session = StreamSession::open(broadcaster.registry().clone(), job_id);
//! tokio::spawn(session.run(transport));
//!
//! // From a producer
//! broadcaster.publish(StatusUpdate::new("running").for_job(job_id))?;
//! broadcaster.complete(job_id)?;
//! ```

mod actor;
mod config;
mod dispatcher;
mod error;
mod messages;
pub mod registry;
pub mod session;

pub use actor::{BroadcastActor, Broadcaster};
pub use config::BroadcastConfig;
pub use dispatcher::{BroadcastStats, DispatchReport, Dispatcher};
pub use error::BroadcastError;
pub use messages::BroadcastMessage;
pub use registry::{BucketKey, RegistryStats, SubscriberRegistry, Subscription};
pub use session::{SessionOutcome, SessionState, StreamSession, Transport, TransportError};
