use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{Job, SpoolError, SpooledJobId, spool::JobSpool};

#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    in_flight: bool,
}

/// In-memory job spool
///
/// Jobs live in a `HashMap` behind an `RwLock`; claims take the write lock so
/// they are atomic within the process. Nothing survives a restart, so this is
/// for tests and development only.
///
/// # Capacity Management
/// An optional capacity bounds the number of jobs (queued and in flight).
/// Enqueueing into a full spool fails with [`SpoolError::CapacityExceeded`].
#[derive(Debug, Clone, Default)]
pub struct MemoryJobSpool {
    jobs: Arc<RwLock<HashMap<SpooledJobId, Entry>>>,
    capacity: Option<usize>,
}

impl MemoryJobSpool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Number of jobs, queued and in flight.
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ids_where(&self, in_flight: bool) -> crate::Result<Vec<SpooledJobId>> {
        let mut ids: Vec<_> = self
            .jobs
            .read()?
            .iter()
            .filter(|(_, entry)| entry.in_flight == in_flight)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl JobSpool for MemoryJobSpool {
    async fn enqueue(&self, job: Job) -> crate::Result<SpooledJobId> {
        let mut jobs = self.jobs.write()?;
        if let Some(capacity) = self.capacity
            && jobs.len() >= capacity
        {
            return Err(SpoolError::CapacityExceeded(capacity));
        }

        let id = SpooledJobId::generate();
        jobs.insert(
            id.clone(),
            Entry {
                job,
                in_flight: false,
            },
        );
        Ok(id)
    }

    async fn list(&self) -> crate::Result<Vec<SpooledJobId>> {
        self.ids_where(false)
    }

    async fn in_flight(&self) -> crate::Result<Vec<SpooledJobId>> {
        self.ids_where(true)
    }

    async fn read(&self, id: &SpooledJobId) -> crate::Result<Job> {
        self.jobs
            .read()?
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    async fn claim(&self, id: &SpooledJobId) -> crate::Result<bool> {
        let mut jobs = self.jobs.write()?;
        match jobs.get_mut(id) {
            Some(entry) if !entry.in_flight => {
                entry.in_flight = true;
                entry.job.claimed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reschedule(&self, id: &SpooledJobId, job: &Job) -> crate::Result<()> {
        let mut job = job.clone();
        job.claimed_at = None;
        self.jobs.write()?.insert(
            id.clone(),
            Entry {
                job,
                in_flight: false,
            },
        );
        Ok(())
    }

    async fn release(&self, id: &SpooledJobId) -> crate::Result<()> {
        let mut jobs = self.jobs.write()?;
        let entry = jobs
            .get_mut(id)
            .filter(|entry| entry.in_flight)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;
        entry.in_flight = false;
        entry.job.claimed_at = None;
        Ok(())
    }

    async fn complete(&self, id: &SpooledJobId) -> crate::Result<()> {
        let mut jobs = self.jobs.write()?;
        match jobs.get(id) {
            Some(entry) if entry.in_flight => {
                jobs.remove(id);
                Ok(())
            }
            _ => Err(SpoolError::NotFound(id.clone())),
        }
    }

    async fn cancel(&self, id: &SpooledJobId) -> crate::Result<bool> {
        let mut jobs = self.jobs.write()?;
        match jobs.get(id) {
            Some(entry) if !entry.in_flight => {
                jobs.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
