//! Decoded stream messages.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A status update as seen by a stream consumer.
///
/// Unknown fields are ignored and missing optional fields read as `None`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatusEvent {
    /// Decode one message body.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// `data.message` when present, otherwise the status itself.
    pub fn message(&self) -> String {
        self.data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(|message| message.as_str())
            .map_or_else(|| self.status.clone(), str::to_string)
    }
}
