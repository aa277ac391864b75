use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use gazette_common::internal;
use tokio::fs;

use crate::{
    Job, PathError, SpoolError, SpooledJobId,
    spool::JobSpool,
    types::{IN_FLIGHT_EXTENSION, JOB_EXTENSION},
};

const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";
const CLAIMING_SUFFIX: &str = ".claiming";

/// File-based job spool
///
/// Each job is one bincode file named by its ULID:
/// - `{id}.job`: queued, waiting for its trigger time
/// - `{id}.job.inflight`: claimed by a worker
///
/// # Atomicity
/// Every write goes to `.tmp_{name}` first and is renamed into place, so a
/// crash never leaves a half-written job. Claiming renames `.job` to
/// `.job.claiming`; when several processes race for the same job the
/// filesystem lets exactly one rename succeed. The winner stamps
/// `claimed_at` and only then publishes `.job.inflight`, so an in-flight
/// file always carries its claim time. Deletes rename to `.deleted` before
/// removing. [`FileJobSpool::init`] sweeps both kinds of leftover and
/// requeues half-finished claims.
#[derive(Debug, Clone)]
pub struct FileJobSpool {
    path: PathBuf,
}

impl FileJobSpool {
    /// Create a spool rooted at `path` after validating it.
    ///
    /// # Errors
    /// If the path is relative, contains `..` or points into a system directory
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a spool path for security
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    /// - Ensures the path is absolute
    fn validate_path(path: &Path) -> Result<(), PathError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(PathError::Unsafe(format!(
                "Spool path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(PathError::Unsafe(format!(
                "Spool path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
            return Err(PathError::Unsafe(format!(
                "Spool path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Initialize the spool directory
    ///
    /// Creates the directory if needed, removes temporary and `.deleted`
    /// files left behind by a crash and requeues claims that never reached
    /// the in-flight state.
    ///
    /// # Errors
    /// - If the spool path cannot be created
    /// - If the path exists but is not a directory
    pub async fn init(&self) -> crate::Result<()> {
        internal!("Initialising job spool at {}", self.path.display());

        if !fs::try_exists(&self.path).await? {
            internal!("{:#?} does not exist, creating...", self.path);
            fs::create_dir_all(&self.path).await?;
        } else if !fs::metadata(&self.path).await?.is_dir() {
            return Err(PathError::NotDirectory(self.path.display().to_string()).into());
        }

        self.cleanup_leftovers().await
    }

    async fn cleanup_leftovers(&self) -> crate::Result<()> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut cleaned = 0;

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.starts_with(TEMP_PREFIX) || filename.ends_with(DELETED_SUFFIX) {
                fs::remove_file(entry.path()).await?;
                cleaned += 1;
            } else if let Some(queued) = filename.strip_suffix(CLAIMING_SUFFIX) {
                fs::rename(entry.path(), self.path.join(queued)).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from job spool"
            );
        }

        Ok(())
    }

    async fn write_atomic(&self, filename: &str, job: &Job) -> crate::Result<()> {
        let temp_path = self.path.join(format!("{TEMP_PREFIX}{filename}"));
        fs::write(&temp_path, job.encode()?).await?;
        fs::rename(&temp_path, self.path.join(filename)).await?;
        Ok(())
    }

    async fn remove_two_phase(&self, filename: &str) -> std::io::Result<()> {
        let deleted = self.path.join(format!("{filename}{DELETED_SUFFIX}"));
        fs::rename(self.path.join(filename), &deleted).await?;
        fs::remove_file(&deleted).await
    }

    async fn read_file(&self, filename: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.path.join(filename)).await
    }

    async fn ids_with_suffix(&self, suffix: &str) -> crate::Result<Vec<SpooledJobId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(suffix)
                && !filename.starts_with(TEMP_PREFIX)
                && let Some(id) = SpooledJobId::from_filename(&filename)
            {
                ids.push(id);
            }
        }

        // ULIDs are lexicographically sortable by creation time
        ids.sort();
        Ok(ids)
    }
}

fn not_found_as(id: &SpooledJobId, e: std::io::Error) -> SpoolError {
    if e.kind() == ErrorKind::NotFound {
        SpoolError::NotFound(id.clone())
    } else {
        SpoolError::Io(e)
    }
}

#[async_trait]
impl JobSpool for FileJobSpool {
    #[tracing::instrument(level = "debug", skip(self, job), fields(content_id = %job.content_id))]
    async fn enqueue(&self, job: Job) -> crate::Result<SpooledJobId> {
        let id = SpooledJobId::generate();
        self.write_atomic(&id.job_filename(), &job).await?;

        internal!(
            level = DEBUG,
            "Spooled job {id} for content {} due at {}",
            job.content_id,
            job.not_before
        );

        Ok(id)
    }

    async fn list(&self) -> crate::Result<Vec<SpooledJobId>> {
        // `.job.inflight` does not end with `.job`, so in-flight jobs are excluded
        self.ids_with_suffix(JOB_EXTENSION).await
    }

    async fn in_flight(&self) -> crate::Result<Vec<SpooledJobId>> {
        self.ids_with_suffix(IN_FLIGHT_EXTENSION).await
    }

    async fn read(&self, id: &SpooledJobId) -> crate::Result<Job> {
        let bytes = match self.read_file(&id.job_filename()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => self
                .read_file(&id.in_flight_filename())
                .await
                .map_err(|e| not_found_as(id, e))?,
            Err(e) => return Err(e.into()),
        };

        Job::decode(&bytes)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn claim(&self, id: &SpooledJobId) -> crate::Result<bool> {
        let claiming = format!("{}{CLAIMING_SUFFIX}", id.job_filename());
        let claiming_path = self.path.join(&claiming);

        match fs::rename(self.path.join(id.job_filename()), &claiming_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let bytes = self
            .read_file(&claiming)
            .await
            .map_err(|e| not_found_as(id, e))?;
        let mut job = Job::decode(&bytes)?;
        job.claimed_at = Some(Utc::now());
        self.write_atomic(&id.in_flight_filename(), &job).await?;
        fs::remove_file(&claiming_path).await?;

        Ok(true)
    }

    async fn reschedule(&self, id: &SpooledJobId, job: &Job) -> crate::Result<()> {
        let mut job = job.clone();
        job.claimed_at = None;
        self.write_atomic(&id.job_filename(), &job).await?;

        match fs::remove_file(self.path.join(id.in_flight_filename())).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn release(&self, id: &SpooledJobId) -> crate::Result<()> {
        let bytes = self
            .read_file(&id.in_flight_filename())
            .await
            .map_err(|e| not_found_as(id, e))?;
        let job = Job::decode(&bytes)?;
        self.reschedule(id, &job).await
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn complete(&self, id: &SpooledJobId) -> crate::Result<()> {
        self.remove_two_phase(&id.in_flight_filename())
            .await
            .map_err(|e| not_found_as(id, e))?;

        internal!(level = DEBUG, "Completed job {id}");
        Ok(())
    }

    async fn cancel(&self, id: &SpooledJobId) -> crate::Result<bool> {
        match self.remove_two_phase(&id.job_filename()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(FileJobSpool::new("/var/spool/gazette").is_ok());
        assert!(FileJobSpool::new("relative/spool").is_err());
        assert!(FileJobSpool::new("/var/spool/../../etc").is_err());
        assert!(FileJobSpool::new("/etc/gazette").is_err());
        assert!(FileJobSpool::new("/proc/self").is_err());
    }
}
