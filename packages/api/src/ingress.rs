//! Update ingress: producers report job progress here.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use status_core::{JobId, UpdateRequest, is_done_marker};

use crate::error::ApiError;
use crate::init::AppState;

/// Job filter carried out-of-band as `?job_id=`.
#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    #[serde(default)]
    pub job_id: Option<String>,
}

impl JobQuery {
    pub fn job_id(&self) -> Option<JobId> {
        JobId::from_optional(self.job_id.as_deref())
    }
}

/// Acknowledgement returned once an update is queued for delivery.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub received: bool,
}

fn accepted() -> (StatusCode, Json<Ack>) {
    (StatusCode::ACCEPTED, Json(Ack { received: true }))
}

/// `POST /api/status-update`
///
/// Accepts `{status, progress, data}`. A body of exactly `[DONE]`, or a
/// status of `[DONE]`, ends the job's streams instead of publishing.
pub async fn status_update(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), ApiError> {
    let job_id = query.job_id();

    if is_done_marker(&String::from_utf8_lossy(&body)) {
        state.broadcaster.complete(job_id)?;
        return Ok(accepted());
    }

    let request = UpdateRequest::from_slice(&body)?;
    let job_id = request.target(job_id);
    if is_done_marker(&request.status) {
        state.broadcaster.complete(job_id)?;
        return Ok(accepted());
    }

    let update = request.into_update(job_id)?;
    tracing::info!("Received update: {}", update.description());
    state.broadcaster.publish(update)?;

    Ok(accepted())
}

/// `POST /api/status-complete`
pub async fn status_complete(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<(StatusCode, Json<Ack>), ApiError> {
    state.broadcaster.complete(query.job_id())?;
    Ok(accepted())
}
