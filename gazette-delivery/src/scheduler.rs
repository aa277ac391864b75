//! Durable registration of future deliveries.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use gazette_common::{audit, internal, models::ContentId, tracing::info};
use gazette_spool::{Job, JobSpool, SpoolError, SpooledJobId};
use gazette_store::RecordStore;
use serde::Serialize;

use crate::error::ScheduleError;

/// A queued job as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingJob {
    pub id: SpooledJobId,
    pub content_id: ContentId,
    pub not_before: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Registers "deliver content X no earlier than T" with the job spool.
///
/// The scheduler never waits for a delivery; once [`Self::schedule`] returns,
/// the job is on disk and a processor will pick it up.
#[derive(Debug, Clone)]
pub struct DeliveryScheduler {
    spool: Arc<dyn JobSpool>,
}

impl DeliveryScheduler {
    #[must_use]
    pub fn new(spool: Arc<dyn JobSpool>) -> Self {
        Self { spool }
    }

    #[must_use]
    pub fn spool(&self) -> &Arc<dyn JobSpool> {
        &self.spool
    }

    /// Persist a job that triggers delivery of `content_id` at `not_before`.
    ///
    /// # Errors
    /// [`ScheduleError::Spool`] if the job could not be persisted. Nothing is
    /// rolled back; the content simply stays undelivered.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn schedule(
        &self,
        content_id: ContentId,
        not_before: DateTime<Utc>,
    ) -> Result<SpooledJobId, ScheduleError> {
        let id = self.spool.enqueue(Job::new(content_id, not_before)).await?;

        info!(%id, %content_id, %not_before, "Delivery scheduled");
        audit::log_content_scheduled(content_id.get(), &not_before.to_rfc3339(), &id.to_string());

        Ok(id)
    }

    /// Trigger delivery as soon as a processor polls.
    pub async fn schedule_now(&self, content_id: ContentId) -> Result<SpooledJobId, ScheduleError> {
        self.schedule(content_id, Utc::now()).await
    }

    /// Withdraw a job that has not started.
    ///
    /// Returns `false` for unknown jobs and for jobs already claimed by a
    /// worker.
    pub async fn cancel(&self, id: &SpooledJobId) -> Result<bool, ScheduleError> {
        let cancelled = self.spool.cancel(id).await?;
        if cancelled {
            info!(%id, "Delivery job cancelled");
        }
        Ok(cancelled)
    }

    /// Queued jobs, earliest trigger first.
    pub async fn pending_jobs(&self) -> Result<Vec<PendingJob>, ScheduleError> {
        let mut pending = Vec::new();

        for id in self.spool.list().await? {
            let job = match self.spool.read(&id).await {
                Ok(job) => job,
                // Claimed or cancelled while we were listing
                Err(SpoolError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            pending.push(PendingJob {
                id,
                content_id: job.content_id,
                not_before: job.not_before,
                attempts: job.attempts,
                last_error: job.last_error,
            });
        }

        pending.sort_by(|a, b| a.not_before.cmp(&b.not_before).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    /// Enqueue a job for every undelivered content item without one.
    ///
    /// Covers schedules lost to a spool outage at publish time. Jobs keep the
    /// content's original schedule, so overdue items fire on the next poll.
    pub async fn reconcile(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Vec<SpooledJobId>, ScheduleError> {
        let mut covered = HashSet::new();
        let mut job_ids = self.spool.list().await?;
        job_ids.extend(self.spool.in_flight().await?);

        for id in job_ids {
            match self.spool.read(&id).await {
                Ok(job) => {
                    covered.insert(job.content_id);
                }
                Err(SpoolError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut created = Vec::new();
        for content in store.list_undelivered().await? {
            if covered.contains(&content.id) {
                continue;
            }
            created.push(self.schedule(content.id, content.scheduled_time).await?);
        }

        if !created.is_empty() {
            internal!(
                level = INFO,
                "Reconciled {} undelivered content item(s) without a job",
                created.len()
            );
        }

        Ok(created)
    }
}
