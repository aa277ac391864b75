//! Claiming due jobs and settling them once their delivery returns.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use gazette_common::tracing::{debug, error, info, warn};
use gazette_spool::{Job, JobSpool, SpooledJobId};
use tokio::task::JoinSet;

use crate::{
    error::DeliveryError, executor::DeliveryExecutor, report::DeliveryOutcome,
    retry::next_retry_time,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub jitter_factor: f64,
    /// Delay before re-checking content another invocation is delivering
    pub recheck_after: TimeDelta,
}

/// What to do with a job after its delivery returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Finished, successfully or not; remove it
    Complete,
    /// Put it back in the queue to run again at `job.not_before`
    Reschedule(Job),
    /// Give up; remove it
    Drop,
}

/// Decide a job's fate from its delivery result.
pub fn disposition(
    result: &Result<DeliveryOutcome, DeliveryError>,
    job: Job,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Disposition {
    match result {
        Ok(DeliveryOutcome::Delivered(_) | DeliveryOutcome::AlreadyDelivered) => {
            Disposition::Complete
        }
        Ok(DeliveryOutcome::InProgress) => {
            let not_before = now.checked_add_signed(policy.recheck_after).unwrap_or(now);
            Disposition::Reschedule(Job {
                not_before,
                claimed_at: None,
                ..job
            })
        }
        Err(e) if e.is_system() => {
            let attempt = job.attempts.saturating_add(1);
            if attempt >= policy.max_attempts {
                return Disposition::Drop;
            }

            let retry_at = next_retry_time(
                now,
                attempt,
                policy.base_delay_secs,
                policy.max_delay_secs,
                policy.jitter_factor,
            );
            Disposition::Reschedule(job.retry_at(retry_at, e.to_string()))
        }
        Err(_) => Disposition::Drop,
    }
}

/// Claim due jobs and start them, up to `max_concurrent` running at once.
///
/// Returns how many jobs were started.
pub async fn dispatch_due_jobs(
    executor: &Arc<DeliveryExecutor>,
    spool: &Arc<dyn JobSpool>,
    policy: RetryPolicy,
    max_concurrent: usize,
    running: &mut JoinSet<()>,
) -> gazette_spool::Result<usize> {
    let mut started = 0;

    for (id, job) in spool.due(Utc::now()).await? {
        if running.len() >= max_concurrent.max(1) {
            break;
        }

        // Lost the race to another worker, or cancelled since listing
        if !spool.claim(&id).await? {
            continue;
        }

        started += 1;
        running.spawn(run_job(
            Arc::clone(executor),
            Arc::clone(spool),
            id,
            job,
            policy,
        ));
    }

    Ok(started)
}

/// Run one claimed job and settle it in the spool.
async fn run_job(
    executor: Arc<DeliveryExecutor>,
    spool: Arc<dyn JobSpool>,
    id: SpooledJobId,
    job: Job,
    policy: RetryPolicy,
) {
    let content_id = job.content_id;
    let result = executor.trigger_delivery(content_id).await;

    match &result {
        Ok(DeliveryOutcome::Delivered(report)) => info!(%id, "Delivery finished: {report}"),
        Ok(DeliveryOutcome::AlreadyDelivered) => debug!(%id, %content_id, "Content already delivered"),
        Ok(DeliveryOutcome::InProgress) => {
            debug!(%id, %content_id, "Content is being delivered elsewhere, checking again later");
        }
        Err(e) if e.is_system() => warn!(%id, %content_id, attempts = job.attempts + 1, "Delivery failed: {e}"),
        Err(e) => error!(%id, %content_id, "Delivery failed permanently, dropping job: {e}"),
    }

    let settled = match disposition(&result, job, &policy, Utc::now()) {
        Disposition::Complete => spool.complete(&id).await,
        Disposition::Reschedule(job) => {
            debug!(%id, not_before = %job.not_before, "Job rescheduled");
            spool.reschedule(&id, &job).await
        }
        Disposition::Drop => {
            if result.as_ref().is_err_and(DeliveryError::is_system) {
                error!(
                    %id,
                    %content_id,
                    max_attempts = policy.max_attempts,
                    "Giving up on delivery after repeated failures; content stays undelivered"
                );
            }
            spool.complete(&id).await
        }
    };

    if let Err(e) = settled {
        error!(%id, "Failed to settle job in the spool, it will be recovered: {e}");
    }
}
