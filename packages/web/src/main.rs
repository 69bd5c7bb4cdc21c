//! Status broadcast server binary.

use tracing_subscriber::EnvFilter;

use api::{ServerConfig, init_status_service, router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let bind_addr = config.bind_addr;

    let (state, dispatcher) = init_status_service(config).await?;
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Status server listening on {}", listener.local_addr()?);

    let registry = state.broadcaster.registry().clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open streams never finish on their own; end them so the
            // connections can drain.
            let closed = registry.close_all();
            tracing::info!("Shutdown requested, closed {} stream(s)", closed);
        })
        .await?;

    tracing::info!("Shutting down status dispatcher");
    state.broadcaster.stop();
    dispatcher.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
