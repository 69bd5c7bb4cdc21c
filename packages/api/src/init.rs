//! Server initialization for the status broadcast system.

use std::sync::Arc;

use broadcast::{BroadcastError, Broadcaster};

use crate::config::ServerConfig;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Broadcaster,
    pub config: Arc<ServerConfig>,
}

/// Initialize the status broadcast system.
///
/// This should be called once at server startup before handling requests.
/// The returned handle resolves when the dispatcher actor stops.
pub async fn init_status_service(
    config: ServerConfig,
) -> Result<(AppState, tokio::task::JoinHandle<()>), BroadcastError> {
    tracing::info!("Initializing status broadcast system...");

    let (broadcaster, handle) = Broadcaster::start(config.broadcast.clone()).await?;

    tracing::info!(
        "Status broadcast system initialized (queue capacity {}, keep-alive {:?})",
        config.broadcast.queue_capacity,
        config.keep_alive
    );

    let state = AppState {
        broadcaster,
        config: Arc::new(config),
    };
    Ok((state, handle))
}
