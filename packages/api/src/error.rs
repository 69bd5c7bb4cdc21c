//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broadcast::BroadcastError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed status update: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Malformed(_) => StatusCode::BAD_REQUEST,
            ApiError::Broadcast(BroadcastError::Stopped | BroadcastError::Timeout) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Broadcast(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Status API error: {}", self);
        } else {
            tracing::warn!("Rejected status request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
