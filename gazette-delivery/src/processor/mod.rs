//! Long-running worker that turns due spool jobs into deliveries.

mod process;

use std::{sync::Arc, time::Duration};

use gazette_common::{
    Signal, internal,
    tracing::{debug, error, info, warn},
};
use gazette_spool::JobSpool;
use gazette_store::RecordStore;
use gazette_transport::Transport;
use serde::Deserialize;
use tokio::{task::JoinSet, time::MissedTickBehavior};

use self::process::RetryPolicy;
use crate::{
    compose::DEFAULT_SUBJECT_PREFIX,
    error::{DeliveryError, SystemError},
    executor::{DEFAULT_CLAIM_LEASE_SECS, DeliveryExecutor, ExecutorSettings},
    retry::secs,
    scheduler::DeliveryScheduler,
};

const fn default_poll_interval() -> u64 {
    5
}

const fn default_max_concurrent_deliveries() -> usize {
    4
}

const fn default_claim_lease() -> u64 {
    DEFAULT_CLAIM_LEASE_SECS
}

const fn default_stale_job() -> u64 {
    900
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_base_retry_delay() -> u64 {
    60
}

const fn default_max_retry_delay() -> u64 {
    3600
}

const fn default_retry_jitter_factor() -> f64 {
    0.2
}

const fn default_send_concurrency() -> usize {
    1
}

fn default_subject_prefix() -> String {
    DEFAULT_SUBJECT_PREFIX.to_string()
}

const fn default_shutdown_timeout() -> u64 {
    30
}

const fn default_reconcile_on_startup() -> bool {
    true
}

/// Polls the job spool and runs due deliveries in parallel.
///
/// Deserialized from the `delivery` section of the configuration, then
/// wired to its collaborators with [`Self::init`].
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// How often to look for due jobs (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Deliveries running at once in this process
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// Age after which a content claim no longer blocks other deliveries
    ///
    /// Default: 600 seconds
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// Age after which an in-flight job is returned to the queue, assuming
    /// its worker died. Keep this above `claim_lease_secs`.
    ///
    /// Default: 900 seconds
    #[serde(default = "default_stale_job")]
    pub stale_job_secs: u64,

    /// Runs ending in a system fault before the job is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt up to `max_retry_delay_secs`
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,

    /// A factor of 0.2 means ±20% randomness on each retry delay
    #[serde(default = "default_retry_jitter_factor")]
    pub retry_jitter_factor: f64,

    /// Parallel sends within one delivery
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// Remember mailed recipients so retries skip them
    #[serde(default)]
    pub record_sent_recipients: bool,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// How long shutdown waits for in-flight deliveries
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Enqueue jobs for undelivered content that has none when starting
    #[serde(default = "default_reconcile_on_startup")]
    pub reconcile_on_startup: bool,

    #[serde(skip)]
    executor: Option<Arc<DeliveryExecutor>>,

    #[serde(skip)]
    scheduler: Option<DeliveryScheduler>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            claim_lease_secs: default_claim_lease(),
            stale_job_secs: default_stale_job(),
            max_attempts: default_max_attempts(),
            base_retry_delay_secs: default_base_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
            retry_jitter_factor: default_retry_jitter_factor(),
            send_concurrency: default_send_concurrency(),
            record_sent_recipients: false,
            subject_prefix: default_subject_prefix(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            reconcile_on_startup: default_reconcile_on_startup(),
            executor: None,
            scheduler: None,
        }
    }
}

impl DeliveryProcessor {
    /// Settings for executors built from this configuration.
    #[must_use]
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            claim_lease_secs: self.claim_lease_secs,
            send_concurrency: self.send_concurrency,
            record_sent_recipients: self.record_sent_recipients,
            subject_prefix: self.subject_prefix.clone(),
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_secs: self.base_retry_delay_secs,
            max_delay_secs: self.max_retry_delay_secs,
            jitter_factor: self.retry_jitter_factor,
            recheck_after: secs(self.claim_lease_secs),
        }
    }

    pub fn init(
        &mut self,
        store: Arc<dyn RecordStore>,
        spool: Arc<dyn JobSpool>,
        transport: Arc<dyn Transport>,
    ) {
        internal!("Initialising Delivery Processor ...");

        if self.stale_job_secs <= self.claim_lease_secs {
            warn!(
                stale_job_secs = self.stale_job_secs,
                claim_lease_secs = self.claim_lease_secs,
                "Stale jobs are recovered before their claim expires; recovered jobs will report InProgress until it does"
            );
        }

        self.executor = Some(Arc::new(
            DeliveryExecutor::new(store, transport).with_settings(self.executor_settings()),
        ));
        self.scheduler = Some(DeliveryScheduler::new(spool));
    }

    /// Run until a shutdown signal arrives.
    ///
    /// ## Graceful Shutdown
    ///
    /// On [`Signal::Shutdown`] the processor stops taking jobs and waits up
    /// to `shutdown_timeout_secs` for running deliveries. Deliveries still
    /// running after that are abandoned; their jobs stay in flight and are
    /// recovered once `stale_job_secs` has passed.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Self::init`] was not called.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        let (Some(executor), Some(scheduler)) = (&self.executor, &self.scheduler) else {
            return Err(SystemError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            )
            .into());
        };
        let spool = scheduler.spool();

        internal!("Delivery processor starting");

        if self.reconcile_on_startup {
            match scheduler.reconcile(executor.store().as_ref()).await {
                Ok(created) if !created.is_empty() => {
                    info!(count = created.len(), "Scheduled undelivered content without jobs");
                }
                Ok(_) => {}
                Err(e) => error!("Reconciliation failed: {e}"),
            }
        }

        let mut poll = tokio::time::interval(Duration::from_secs(self.poll_interval_secs.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let policy = self.retry_policy();
        let mut running = JoinSet::new();

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match spool.recover_stale(secs(self.stale_job_secs)).await {
                        Ok(0) => {}
                        Ok(count) => warn!("Recovered {count} stale in-flight job(s)"),
                        Err(e) => error!("Error recovering stale jobs: {e}"),
                    }

                    match process::dispatch_due_jobs(
                        executor,
                        spool,
                        policy,
                        self.max_concurrent_deliveries,
                        &mut running,
                    )
                    .await
                    {
                        Ok(0) => {}
                        Ok(count) => debug!("Started {count} delivery job(s)"),
                        Err(e) => error!("Error reading the job spool: {e}"),
                    }
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = joined {
                        error!("Delivery task failed: {e}; its job will be recovered");
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!("Delivery processor received shutdown signal");
                        }
                        Err(e) => {
                            error!("Delivery processor shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        self.drain(running).await;
        internal!("Delivery processor shutdown complete");

        Ok(())
    }

    async fn drain(&self, mut running: JoinSet<()>) {
        if running.is_empty() {
            return;
        }

        let timeout = Duration::from_secs(self.shutdown_timeout_secs);
        internal!(
            "Waiting up to {timeout:?} for {} in-flight deliveries",
            running.len()
        );

        let drained = tokio::time::timeout(timeout, async {
            while running.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            internal!("All in-flight deliveries completed");
        } else {
            warn!(
                remaining = running.len(),
                "Shutdown timeout exceeded, remaining deliveries will be recovered on restart"
            );
            running.abort_all();
        }
    }
}
