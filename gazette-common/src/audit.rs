//! Audit logging for newsletter lifecycle events
//!
//! Audit records are ordinary `tracing` events carrying an `event` field so
//! they can be routed separately by whatever collects the logs.
//!
//! ## Audit Events
//!
//! - `ContentScheduled`: content accepted and a delivery job registered
//! - `DeliveryStarted`: an executor claimed content and is about to send
//! - `RecipientRejected`: the transport refused or failed a single recipient
//! - `DeliveryCompleted`: content committed as delivered
//! - `DeliveryAborted`: delivery stopped on a system fault, content left pending
//!
//! Subscriber addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of subscriber addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialize audit logging with configuration. Only the first call wins.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if !redact {
        return email.to_string();
    }

    // Keep domain but redact local part
    email
        .split_once('@')
        .map_or_else(|| "[REDACTED]".to_string(), |(_, domain)| {
            format!("[REDACTED]@{domain}")
        })
}

pub fn log_content_scheduled(content_id: i64, not_before: &str, job_id: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "ContentScheduled",
        content_id = content_id,
        not_before = %not_before,
        job_id = %job_id,
        "Audit: Content scheduled for delivery"
    );
}

pub fn log_delivery_started(content_id: i64, topic: &str, recipient_count: usize) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryStarted",
        content_id = content_id,
        topic = %topic,
        recipient_count = recipient_count,
        "Audit: Delivery started"
    );
}

/// Logged once per recipient the transport did not accept.
pub fn log_recipient_rejected(content_id: i64, email: &str, reason: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(email, config.redact_recipients);

    tracing::event!(
        tracing::Level::WARN,
        event = "RecipientRejected",
        content_id = content_id,
        recipient = %recipient,
        reason = %reason,
        "Audit: Recipient rejected"
    );
}

/// # Fields
/// - `succeeded`/`failed`/`skipped`: per-recipient tallies
/// - `duration_ms`: wall time from claim to commit
pub fn log_delivery_completed(
    content_id: i64,
    topic: &str,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    duration_ms: u128,
) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryCompleted",
        content_id = content_id,
        topic = %topic,
        succeeded = succeeded,
        failed = failed,
        skipped = skipped,
        duration_ms = duration_ms,
        "Audit: Delivery completed"
    );
}

pub fn log_delivery_aborted(content_id: i64, error: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::ERROR,
        event = "DeliveryAborted",
        content_id = content_id,
        error = %error,
        "Audit: Delivery aborted, content left undelivered"
    );
}
