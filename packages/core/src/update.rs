//! Status updates published by running jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::JobId;

/// A progress report for one job, or for everyone when `job_id` is absent.
///
/// Fields are private so an update cannot change after it is built; the
/// dispatcher serializes it once and shares the bytes with every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    /// Opaque JSON fragment, only interpreted by the UI.
    #[serde(default)]
    data: Option<Box<RawValue>>,
    #[serde(default)]
    job_id: Option<JobId>,
    timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    /// Create a global update with the given status.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: None,
            data: None,
            job_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Scope the update to a single job.
    pub fn for_job(mut self, job_id: Option<JobId>) -> Self {
        self.job_id = job_id;
        self
    }

    /// Set the progress fraction.
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    fn with_raw_data(mut self, data: Box<RawValue>) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize `value` compactly and attach it as the payload.
    ///
    /// The stored fragment never contains raw line breaks, so it always fits
    /// in a single `data:` line.
    pub fn with_data<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let raw = serde_json::value::to_raw_value(value)?;
        Ok(self.with_raw_data(raw))
    }

    /// The greeting written to a stream right after it subscribes.
    pub fn connected(job_id: Option<&JobId>) -> Self {
        let message = match job_id {
            Some(job) => format!("Connected to status updates for job {}", job),
            None => "Connected to status updates".to_string(),
        };
        let update = Self::new("connected").for_job(job_id.cloned());
        match update.clone().with_data(&serde_json::json!({ "message": message })) {
            Ok(update) => update,
            Err(_) => update,
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn data(&self) -> Option<&RawValue> {
        self.data.as_deref()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the JSON body carried by one stream message.
    pub fn to_json(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    /// Get a short description of this update for logging.
    pub fn description(&self) -> String {
        let target = self
            .job_id
            .as_ref()
            .map_or_else(|| "all jobs".to_string(), |job| format!("job {}", job));
        match self.progress {
            Some(progress) => format!("{} -> {} ({:.0}%)", target, self.status, progress * 100.0),
            None => format!("{} -> {}", target, self.status),
        }
    }
}

/// Body accepted by the ingress endpoint.
///
/// The job id normally travels out-of-band as a query parameter; a `jobId`
/// field in the body is only used when the query omits it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub job_id: Option<String>,
}

impl UpdateRequest {
    /// Parse a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Resolve the target job, preferring the out-of-band id.
    pub fn target(&self, out_of_band: Option<JobId>) -> Option<JobId> {
        out_of_band.or_else(|| JobId::from_optional(self.job_id.as_deref()))
    }

    /// Normalize into a publishable update.
    ///
    /// The payload is re-serialized compactly, dropping whatever whitespace
    /// and line endings the producer formatted it with.
    pub fn into_update(self, job_id: Option<JobId>) -> Result<StatusUpdate, serde_json::Error> {
        let mut update = StatusUpdate::new(self.status).for_job(job_id);
        if let Some(progress) = self.progress {
            update = update.with_progress(progress);
        }
        match self.data {
            // An explicit `null` payload is the same as no payload.
            None | Some(serde_json::Value::Null) => Ok(update),
            Some(data) => update.with_data(&data),
        }
    }
}
