use std::{fmt, time::Duration};

use gazette_common::models::ContentId;
use serde::Serialize;

/// A recipient the transport did not accept, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecipient {
    pub email: String,
    pub reason: String,
}

/// Tally of one completed delivery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub content_id: ContentId,
    pub topic: String,
    /// Sends actually handed to the transport
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Recipients already mailed by an earlier run (sent ledger)
    pub skipped: usize,
    pub failed_recipients: Vec<FailedRecipient>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(elapsed.as_millis())
}

impl DeliveryReport {
    pub(crate) fn empty(content_id: ContentId, topic: impl Into<String>) -> Self {
        Self {
            content_id,
            topic: topic.into(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failed_recipients: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Addresses that failed, in the order their failures were observed.
    pub fn failed_emails(&self) -> Vec<&str> {
        self.failed_recipients.iter().map(|f| f.email.as_str()).collect()
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "content {} ({}): {} succeeded, {} failed, {} skipped in {}ms",
            self.content_id,
            self.topic,
            self.succeeded,
            self.failed,
            self.skipped,
            self.elapsed.as_millis()
        )?;

        for failure in &self.failed_recipients {
            write!(f, "\n  {}: {}", failure.email, failure.reason)?;
        }

        Ok(())
    }
}

/// What a call to [`crate::DeliveryExecutor::trigger_delivery`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// This call ran the delivery and committed it
    Delivered(DeliveryReport),
    /// The content was committed earlier; nothing was sent
    AlreadyDelivered,
    /// Another invocation holds a live claim; nothing was sent
    InProgress,
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn report(&self) -> Option<&DeliveryReport> {
        match self {
            Self::Delivered(report) => Some(report),
            Self::AlreadyDelivered | Self::InProgress => None,
        }
    }
}
