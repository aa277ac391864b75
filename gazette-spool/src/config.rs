use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileJobSpool, MemoryJobSpool},
    spool::JobSpool,
};

/// Configuration for the job spool
///
/// # Examples
///
/// File-backed spool in RON config:
/// ```ron
/// Gazette (
///     spool: File(
///         path: "/var/spool/gazette",
///     ),
/// )
/// ```
///
/// Memory-backed spool with capacity limit:
/// ```ron
/// Gazette (
///     spool: Memory(
///         capacity: Some(1000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum SpoolConfig {
    /// File-based spool (production)
    File { path: PathBuf },
    /// Memory-based spool (testing/development)
    Memory {
        /// Maximum number of jobs to hold (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/spool/gazette"),
        }
    }
}

impl SpoolConfig {
    /// Get the filesystem path for file-backed spools, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Build and initialise the configured spool
    ///
    /// # Errors
    /// If the spool path is invalid or the directory cannot be prepared
    pub async fn into_job_spool(self) -> crate::Result<Arc<dyn JobSpool>> {
        match self {
            Self::File { path } => {
                let spool = FileJobSpool::new(path)?;
                spool.init().await?;
                Ok(Arc::new(spool))
            }
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryJobSpool::new()) as Arc<dyn JobSpool>,
                |capacity| Arc::new(MemoryJobSpool::with_capacity(capacity)),
            )),
        }
    }
}
