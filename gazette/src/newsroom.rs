//! Editorial operations: topics, subscriptions and publishing.
//!
//! The newsroom is the only writer of topics, subscribers and content. It
//! hands freshly published content to the [`DeliveryScheduler`] and returns
//! without waiting for delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gazette_common::{
    models::{Content, ContentId, MAX_TOPIC_NAME_LEN, NewContent, NewTopic, Subscriber, Topic, TopicId},
    tracing::{info, warn},
};
use gazette_delivery::{DeliveryScheduler, ScheduleError};
use gazette_spool::SpooledJobId;
use gazette_store::{RecordStore, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsroomError {
    #[error("Invalid topic name {0:?}: must be 1-{max} characters", max = MAX_TOPIC_NAME_LEN)]
    InvalidTopicName(String),

    #[error("Topic already exists: {0}")]
    TopicExists(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Content not found: {0}")]
    ContentNotFound(ContentId),

    #[error("Content {0} has already been delivered")]
    AlreadyDelivered(ContentId),

    #[error("Invalid email address {email:?}: {reason}")]
    InvalidEmail { email: String, reason: String },

    #[error("Scheduled time {0} is not in the future")]
    ScheduleInPast(DateTime<Utc>),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl From<StoreError> for NewsroomError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TopicExists(name) => Self::TopicExists(name),
            StoreError::TopicNotFound(id) => Self::TopicNotFound(id.to_string()),
            StoreError::ContentNotFound(id) => Self::ContentNotFound(id),
            other => Self::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NewsroomError>;

/// Freshly published content and how scheduling went.
///
/// Content is persisted before the job is enqueued, so a spool failure leaves
/// the content in place with `schedule` set to the error. Startup
/// reconciliation or `retry` picks it up later.
#[derive(Debug)]
pub struct Publication {
    pub content: Content,
    pub schedule: std::result::Result<SpooledJobId, ScheduleError>,
}

#[derive(Debug, Clone)]
pub struct Newsroom {
    store: Arc<dyn RecordStore>,
    scheduler: DeliveryScheduler,
}

impl Newsroom {
    #[must_use]
    pub const fn new(store: Arc<dyn RecordStore>, scheduler: DeliveryScheduler) -> Self {
        Self { store, scheduler }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[must_use]
    pub const fn scheduler(&self) -> &DeliveryScheduler {
        &self.scheduler
    }

    pub async fn create_topic(&self, name: &str, description: Option<String>) -> Result<Topic> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TOPIC_NAME_LEN {
            return Err(NewsroomError::InvalidTopicName(name.to_string()));
        }

        let topic = self
            .store
            .create_topic(NewTopic {
                name: name.to_string(),
                description,
            })
            .await?;

        info!(topic = %topic.name, id = %topic.id, "Topic created");
        Ok(topic)
    }

    pub async fn set_topic_description(
        &self,
        topic_id: TopicId,
        description: Option<String>,
    ) -> Result<Topic> {
        Ok(self
            .store
            .update_topic_description(topic_id, description)
            .await?)
    }

    /// Look a topic up by numeric id, falling back to its name.
    pub async fn resolve_topic(&self, key: &str) -> Result<Topic> {
        if let Ok(id) = key.parse::<TopicId>()
            && let Some(topic) = self.store.get_topic(id).await?
        {
            return Ok(topic);
        }

        self.store
            .find_topic_by_name(key)
            .await?
            .ok_or_else(|| NewsroomError::TopicNotFound(key.to_string()))
    }

    /// Subscribe every address in `emails` to a topic.
    ///
    /// All addresses are validated before any is stored. Addresses that are
    /// already subscribed are skipped; the newly created subscribers are
    /// returned.
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        topic_id: TopicId,
        emails: &[S],
    ) -> Result<Vec<Subscriber>> {
        let addresses = emails
            .iter()
            .map(|email| normalize_email(email.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.require_topic(topic_id).await?;

        let mut created = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.store.subscribe(topic_id, &address).await? {
                Some(subscriber) => created.push(subscriber),
                None => info!(%topic_id, email = %address, "Already subscribed, skipping"),
            }
        }

        Ok(created)
    }

    pub async fn unsubscribe(&self, topic_id: TopicId, email: &str) -> Result<bool> {
        let address = normalize_email(email)?;
        Ok(self.store.unsubscribe(topic_id, &address).await?)
    }

    /// Persist content for a topic and schedule its delivery.
    ///
    /// Returns as soon as the job is enqueued.
    pub async fn publish(
        &self,
        topic_id: TopicId,
        content_text: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Publication> {
        self.require_topic(topic_id).await?;

        if scheduled_time <= Utc::now() {
            return Err(NewsroomError::ScheduleInPast(scheduled_time));
        }

        let content = self
            .store
            .create_content(NewContent {
                topic_id,
                content_text: content_text.to_string(),
                scheduled_time,
            })
            .await?;

        let schedule = self.scheduler.schedule(content.id, scheduled_time).await;
        if let Err(e) = &schedule {
            warn!(content_id = %content.id, "Content saved but delivery was not scheduled: {e}");
        }

        Ok(Publication { content, schedule })
    }

    /// Queue an immediate delivery attempt for undelivered content.
    pub async fn retrigger(&self, content_id: ContentId) -> Result<SpooledJobId> {
        let content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or(NewsroomError::ContentNotFound(content_id))?;

        if content.delivered {
            return Err(NewsroomError::AlreadyDelivered(content_id));
        }

        Ok(self.scheduler.schedule_now(content_id).await?)
    }

    async fn require_topic(&self, topic_id: TopicId) -> Result<Topic> {
        self.store
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| NewsroomError::TopicNotFound(topic_id.to_string()))
    }
}

/// Parse a single mailbox and return its bare address.
///
/// `Reader <reader@example.com>` becomes `reader@example.com`. Groups, lists
/// and addresses without a local part or domain are rejected.
fn normalize_email(input: &str) -> Result<String> {
    let invalid = |reason: &str| NewsroomError::InvalidEmail {
        email: input.to_string(),
        reason: reason.to_string(),
    };

    let parsed = mailparse::addrparse(input.trim()).map_err(|e| invalid(&e.to_string()))?;
    let single = parsed
        .extract_single_info()
        .ok_or_else(|| invalid("expected exactly one mailbox"))?;

    let address = single.addr.trim();
    match address.rsplit_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !address.contains(char::is_whitespace) =>
        {
            Ok(address.to_string())
        }
        _ => Err(invalid("missing local part or domain")),
    }
}
