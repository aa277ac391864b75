use std::io;

use thiserror::Error;

use crate::SpooledJobId;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("spool I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode job: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A job file exists but its contents are not a valid job.
    #[error("could not decode job: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("no spooled job with id {0}")]
    NotFound(SpooledJobId),

    #[error(transparent)]
    Path(#[from] PathError),

    /// The memory spool already holds this many jobs.
    #[error("spool is full ({0} jobs)")]
    CapacityExceeded(usize),

    #[error("spool lock poisoned: {0}")]
    Poisoned(String),
}

/// Rejections of a configured spool directory.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("spool path {0} is not a directory")]
    NotDirectory(String),

    #[error("refusing spool path: {0}")]
    Unsafe(String),
}

pub type Result<T> = std::result::Result<T, SpoolError>;

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned(e.to_string())
    }
}
