use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{Job, SpooledJobId};

/// Storage for delivery jobs
///
/// A job is either *queued* (visible to [`JobSpool::list`]) or *in flight*
/// (owned by the worker that claimed it). Claiming is atomic: when several
/// workers race for one job exactly one of them gets `true`.
#[async_trait]
pub trait JobSpool: Send + Sync + std::fmt::Debug {
    /// Persist a new job and return its id.
    async fn enqueue(&self, job: Job) -> crate::Result<SpooledJobId>;

    /// Ids of queued jobs in creation order.
    async fn list(&self) -> crate::Result<Vec<SpooledJobId>>;

    /// Ids of jobs currently claimed by a worker.
    async fn in_flight(&self) -> crate::Result<Vec<SpooledJobId>>;

    /// Read a job, queued or in flight.
    async fn read(&self, id: &SpooledJobId) -> crate::Result<Job>;

    /// Take ownership of a queued job.
    ///
    /// Returns `false` when the job is gone (claimed elsewhere or cancelled).
    async fn claim(&self, id: &SpooledJobId) -> crate::Result<bool>;

    /// Return an in-flight job to the queue with new contents.
    async fn reschedule(&self, id: &SpooledJobId, job: &Job) -> crate::Result<()>;

    /// Return an in-flight job to the queue unchanged.
    async fn release(&self, id: &SpooledJobId) -> crate::Result<()>;

    /// Remove a finished in-flight job.
    async fn complete(&self, id: &SpooledJobId) -> crate::Result<()>;

    /// Withdraw a queued job. In-flight jobs are left alone and yield `false`.
    async fn cancel(&self, id: &SpooledJobId) -> crate::Result<bool>;

    /// Requeue in-flight jobs claimed longer than `max_age` ago.
    ///
    /// Recovers jobs whose worker died before completing them.
    async fn recover_stale(&self, max_age: Duration) -> crate::Result<usize> {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let mut recovered = 0;

        for id in self.in_flight().await? {
            let job = match self.read(&id).await {
                Ok(job) => job,
                Err(crate::SpoolError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            if job.claimed_at.is_none_or(|claimed_at| claimed_at <= cutoff) {
                self.release(&id).await?;
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    /// Queued jobs whose trigger time has passed, earliest first.
    async fn due(&self, now: DateTime<Utc>) -> crate::Result<Vec<(SpooledJobId, Job)>> {
        let mut due = Vec::new();

        for id in self.list().await? {
            match self.read(&id).await {
                Ok(job) if job.is_due(now) => due.push((id, job)),
                Ok(_) | Err(crate::SpoolError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        due.sort_by(|(a_id, a), (b_id, b)| a.not_before.cmp(&b.not_before).then(a_id.cmp(b_id)));
        Ok(due)
    }
}
