//! Durable queue of delivery jobs.
//!
//! A job says "deliver content X no earlier than T". Jobs are written to the
//! spool before the caller is told they were scheduled, so they survive
//! process restarts. Workers take a job with [`JobSpool::claim`] and finish it
//! with [`JobSpool::complete`] or hand it back with [`JobSpool::reschedule`].

pub mod backends;
pub mod config;
pub mod error;
pub mod job;
pub mod spool;
pub mod types;

pub use backends::{FileJobSpool, MemoryJobSpool};
pub use config::SpoolConfig;
pub use error::{PathError, Result, SpoolError};
pub use job::Job;
pub use spool::JobSpool;
pub use types::SpooledJobId;
