//! Typed errors for delivery and scheduling.
//!
//! [`DeliveryError`] separates outcomes by what the processor should do with
//! the job:
//! - [`PermanentError`]: the job can never succeed, drop it
//! - [`ConfigurationError`]: drop it; re-trigger once the configuration is fixed
//! - [`SystemError`]: a fault in our own dependencies, retry with backoff
//!
//! Per-recipient refusals and transport faults are not errors at this level;
//! they are counted in the [`crate::DeliveryReport`].

use gazette_common::models::{ContentId, TopicId};
use gazette_spool::SpoolError;
use gazette_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    #[error("Content {0} not found")]
    ContentNotFound(ContentId),

    #[error("Topic {0} not found")]
    TopicNotFound(TopicId),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Transport '{0}' is not configured")]
    TransportNotConfigured(&'static str),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("Delivery processor not initialized: {0}")]
    NotInitialized(String),
}

impl From<StoreError> for DeliveryError {
    fn from(error: StoreError) -> Self {
        Self::System(SystemError::Store(error))
    }
}

impl DeliveryError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// System faults are the only errors worth retrying.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

/// Failure to register or manage a delivery job.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Spool unavailable: {0}")]
    Spool(#[from] SpoolError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}
