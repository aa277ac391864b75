use chrono::{DateTime, Utc};
use gazette_common::models::ContentId;
use serde::{Deserialize, Serialize};

/// A request to run delivery for one content item no earlier than `not_before`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub content_id: ContentId,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub not_before: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,

    /// Number of runs that ended in a retryable fault
    pub attempts: u32,

    pub last_error: Option<String>,

    /// When a worker took the job; `None` while queued
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Job {
    #[must_use]
    pub fn new(content_id: ContentId, not_before: DateTime<Utc>) -> Self {
        Self {
            content_id,
            not_before,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            claimed_at: None,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now
    }

    /// Record a failed run and push the trigger time out to `retry_at`.
    #[must_use]
    pub fn retry_at(mut self, retry_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        self.attempts = self.attempts.saturating_add(1);
        self.not_before = retry_at;
        self.last_error = Some(error.into());
        self.claimed_at = None;
        self
    }

    pub(crate) fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let (job, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(job)
    }
}
