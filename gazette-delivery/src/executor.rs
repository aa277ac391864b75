//! Runs one delivery: claim, send to every current subscriber, commit.

use std::{collections::HashSet, sync::Arc, time::Instant};

use futures_util::{StreamExt, stream};
use gazette_common::{
    audit, internal,
    models::{Content, ContentId, Subscriber, Topic},
    outgoing,
    tracing::{debug, warn},
};
use gazette_store::{ClaimOutcome, RecordStore};
use gazette_transport::{SendOutcome, Transport};

use crate::{
    compose::{self, ComposedMessage},
    error::{ConfigurationError, DeliveryError, PermanentError, SystemError},
    report::{DeliveryOutcome, DeliveryReport, FailedRecipient},
    retry::secs,
};

pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 600;

/// Knobs for a single delivery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// How long a claim blocks other invocations before it is treated as
    /// abandoned by a crashed worker.
    pub claim_lease_secs: u64,

    /// Sends in flight at once for one content item. `1` sends sequentially.
    pub send_concurrency: usize,

    /// Keep a per-recipient ledger so a retry after a fault does not mail the
    /// same address twice.
    pub record_sent_recipients: bool,

    /// Subject is `"<prefix>: <topic name>"`
    pub subject_prefix: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
            send_concurrency: 1,
            record_sent_recipients: false,
            subject_prefix: compose::DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }
}

/// How one recipient's send went.
enum Attempt {
    Accepted,
    Failed(String),
}

/// Delivers content items to their topic's subscribers.
#[derive(Debug, Clone)]
pub struct DeliveryExecutor {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn Transport>,
    settings: ExecutorSettings,
}

impl DeliveryExecutor {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            settings: ExecutorSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Deliver `content_id` to every current subscriber of its topic.
    ///
    /// Safe to call repeatedly and concurrently: content that is already
    /// delivered is a no-op, and a live claim held by another call makes this
    /// one return [`DeliveryOutcome::InProgress`] without sending.
    ///
    /// Refused and failed recipients do not stop the run; the content is
    /// committed as delivered once every subscriber has been attempted.
    ///
    /// # Errors
    /// - [`PermanentError`] when the content or its topic is missing
    /// - [`ConfigurationError`] when the transport is not configured
    /// - [`SystemError`] when the store fails; the claim is released and the
    ///   content stays undelivered
    #[tracing::instrument(level = "info", skip(self), fields(transport = self.transport.name()))]
    pub async fn trigger_delivery(
        &self,
        content_id: ContentId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let started = Instant::now();

        let content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or(PermanentError::ContentNotFound(content_id))?;

        if content.delivered {
            debug!("Content already delivered, nothing to do");
            return Ok(DeliveryOutcome::AlreadyDelivered);
        }

        let topic = self
            .store
            .get_topic(content.topic_id)
            .await?
            .ok_or(PermanentError::TopicNotFound(content.topic_id))?;

        let subscribers = self.store.list_subscribers(topic.id).await?;

        if subscribers.is_empty() {
            if !self.store.mark_delivered(content_id).await? {
                return Ok(DeliveryOutcome::AlreadyDelivered);
            }
            internal!(
                level = INFO,
                "Topic '{}' has no subscribers, content {content_id} marked delivered",
                topic.name
            );
            audit::log_delivery_completed(content_id.get(), &topic.name, 0, 0, 0, 0);

            let mut report = DeliveryReport::empty(content_id, &topic.name);
            report.elapsed = started.elapsed();
            return Ok(DeliveryOutcome::Delivered(report));
        }

        if !self.transport.is_configured() {
            return Err(ConfigurationError::TransportNotConfigured(self.transport.name()).into());
        }

        match self
            .store
            .claim_delivery(content_id, secs(self.settings.claim_lease_secs))
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::InProgress { claimed_at } => {
                debug!(%claimed_at, "Another delivery holds the claim");
                return Ok(DeliveryOutcome::InProgress);
            }
            ClaimOutcome::AlreadyDelivered => return Ok(DeliveryOutcome::AlreadyDelivered),
            ClaimOutcome::Missing => return Err(PermanentError::ContentNotFound(content_id).into()),
        }

        match self.deliver_claimed(&content, &topic, subscribers, started).await {
            Ok(report) => Ok(DeliveryOutcome::Delivered(report)),
            Err(error) => {
                audit::log_delivery_aborted(content_id.get(), &error.to_string());
                if let Err(release) = self.store.release_claim(content_id).await {
                    warn!(error = %release, "Failed to release delivery claim; it will expire");
                }
                Err(error)
            }
        }
    }

    /// Steps after the claim: send, record, commit.
    async fn deliver_claimed(
        &self,
        content: &Content,
        topic: &Topic,
        subscribers: Vec<Subscriber>,
        started: Instant,
    ) -> Result<DeliveryReport, DeliveryError> {
        let content_id = content.id;
        let mut report = DeliveryReport::empty(content_id, &topic.name);

        let already_sent = if self.settings.record_sent_recipients {
            self.store.sent_recipients(content_id).await?
        } else {
            HashSet::new()
        };

        let (skipped, recipients): (Vec<_>, Vec<_>) = subscribers
            .into_iter()
            .map(|subscriber| subscriber.email)
            .partition(|email| already_sent.contains(email));
        report.skipped = skipped.len();

        audit::log_delivery_started(content_id.get(), &topic.name, recipients.len());

        let message = compose::compose(
            topic,
            content,
            &self.settings.subject_prefix,
            self.transport.template_free(),
        );

        let mut attempts = stream::iter(recipients)
            .map(|email| self.send_one(content_id, email, &message))
            .buffer_unordered(self.settings.send_concurrency.max(1));

        while let Some(attempt) = attempts.next().await {
            let (email, attempt) = attempt?;
            report.attempted += 1;
            match attempt {
                Attempt::Accepted => report.succeeded += 1,
                Attempt::Failed(reason) => {
                    audit::log_recipient_rejected(content_id.get(), &email, &reason);
                    report.failed += 1;
                    report.failed_recipients.push(FailedRecipient { email, reason });
                }
            }
        }
        drop(attempts);

        if !self.store.mark_delivered(content_id).await? {
            warn!("Content was committed by another delivery while this one held the claim");
        }

        report.elapsed = started.elapsed();
        audit::log_delivery_completed(
            content_id.get(),
            &topic.name,
            report.succeeded,
            report.failed,
            report.skipped,
            report.elapsed.as_millis(),
        );

        Ok(report)
    }

    /// Send to one recipient. Only ledger failures are errors.
    async fn send_one(
        &self,
        content_id: ContentId,
        email: String,
        message: &ComposedMessage,
    ) -> Result<(String, Attempt), DeliveryError> {
        let attempt = match self
            .transport
            .send(&email, &message.subject, &message.body)
            .await
        {
            Ok(SendOutcome::Accepted) => {
                outgoing!(level = DEBUG, "Content {content_id} accepted for {email}");
                if self.settings.record_sent_recipients {
                    self.store
                        .record_sent(content_id, &email)
                        .await
                        .map_err(SystemError::from)?;
                }
                Attempt::Accepted
            }
            Ok(rejected @ SendOutcome::Rejected { .. }) => {
                outgoing!(level = DEBUG, "Content {content_id} {rejected} for {email}");
                Attempt::Failed(rejected.to_string())
            }
            Err(fault) => {
                outgoing!(level = WARN, "Content {content_id} failed for {email}: {fault}");
                Attempt::Failed(fault.to_string())
            }
        };

        Ok((email, attempt))
    }
}
