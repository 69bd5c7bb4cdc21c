//! HTTP API for the job status broadcast system.
//!
//! This crate contains the server surface for:
//! - Update ingress (`POST /api/status-update`, `POST /api/status-complete`)
//! - Real-time streams (`GET /api/status-stream`, SSE)
//! - Health and dispatcher statistics

mod config;
mod error;
mod ingress;
mod init;
mod realtime;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use ingress::{Ack, JobQuery, status_complete, status_update};
pub use init::{AppState, init_status_service};
pub use realtime::{SseTransport, status_stats, status_stream};

// Re-export core types for convenience
pub use status_core::{DONE_SENTINEL, JobId, StatusUpdate};

/// Build the router with every status route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status-update", post(status_update))
        .route("/api/status-complete", post(status_complete))
        .route("/api/status-stream", get(status_stream))
        .route("/api/status-stats", get(status_stats))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
