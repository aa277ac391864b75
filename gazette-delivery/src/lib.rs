//! Deferred newsletter delivery.
//!
//! - [`DeliveryScheduler`] persists "deliver content X at time T" jobs to a
//!   [`gazette_spool::JobSpool`]
//! - [`DeliveryProcessor`] polls the spool and runs due jobs
//! - [`DeliveryExecutor`] performs one delivery against a
//!   [`gazette_store::RecordStore`] and a [`gazette_transport::Transport`]

mod compose;
mod error;
mod executor;
mod processor;
mod report;
mod retry;
mod scheduler;

pub use compose::{ComposedMessage, DEFAULT_SUBJECT_PREFIX, compose};
pub use error::{ConfigurationError, DeliveryError, PermanentError, ScheduleError, SystemError};
pub use executor::{DEFAULT_CLAIM_LEASE_SECS, DeliveryExecutor, ExecutorSettings};
pub use processor::DeliveryProcessor;
pub use report::{DeliveryOutcome, DeliveryReport, FailedRecipient};
pub use retry::next_retry_time;
pub use scheduler::{DeliveryScheduler, PendingJob};
