//! Identifiers for jobs and subscriptions.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identifier for one long-running job.
///
/// Job ids are minted by the backend that runs the job, so the broadcast
/// layer never interprets them beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a job id, returning `None` for empty or whitespace-only input.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Normalize an optional raw id (e.g. a query parameter) into a job filter.
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a subscription, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Ulid);

impl SubscriptionId {
    /// Create a new unique subscription ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_job_ids_mean_broadcast() {
        assert_eq!(JobId::parse(""), None);
        assert_eq!(JobId::parse("   "), None);
        assert_eq!(JobId::from_optional(None), None);
        assert_eq!(
            JobId::from_optional(Some(" abc ")).map(|j| j.to_string()),
            Some("abc".to_string())
        );
    }

    #[test]
    fn subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }
}
