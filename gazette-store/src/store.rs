use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gazette_common::models::{
    Content, ContentId, NewContent, NewTopic, Subscriber, Topic, TopicId,
};

/// Result of trying to take the delivery claim on a content row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the delivery
    Claimed,
    /// Another delivery holds a claim that has not expired
    InProgress { claimed_at: DateTime<Utc> },
    /// The row was already committed as delivered
    AlreadyDelivered,
    /// No such content row
    Missing,
}

/// Transactional storage for topics, subscribers and content.
///
/// Every mutation is atomic with respect to other callers, including callers
/// in other processes when the backend is shared (SQLite).
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Create a topic. Names are unique.
    ///
    /// # Errors
    /// [`crate::StoreError::TopicExists`] when the name is taken.
    async fn create_topic(&self, topic: NewTopic) -> crate::Result<Topic>;

    async fn get_topic(&self, id: TopicId) -> crate::Result<Option<Topic>>;

    async fn find_topic_by_name(&self, name: &str) -> crate::Result<Option<Topic>>;

    async fn list_topics(&self) -> crate::Result<Vec<Topic>>;

    /// The description is the only mutable topic field.
    async fn update_topic_description(
        &self,
        id: TopicId,
        description: Option<String>,
    ) -> crate::Result<Topic>;

    /// Delete a topic together with its subscribers and content.
    async fn delete_topic(&self, id: TopicId) -> crate::Result<bool>;

    /// Subscribe `email` to a topic.
    ///
    /// Returns `None` when the address is already subscribed.
    async fn subscribe(&self, topic_id: TopicId, email: &str)
    -> crate::Result<Option<Subscriber>>;

    async fn unsubscribe(&self, topic_id: TopicId, email: &str) -> crate::Result<bool>;

    /// Current subscribers of a topic, oldest first.
    async fn list_subscribers(&self, topic_id: TopicId) -> crate::Result<Vec<Subscriber>>;

    async fn create_content(&self, content: NewContent) -> crate::Result<Content>;

    async fn get_content(&self, id: ContentId) -> crate::Result<Option<Content>>;

    /// All content, optionally restricted to one topic, ordered by id.
    async fn list_content(&self, topic_id: Option<TopicId>) -> crate::Result<Vec<Content>>;

    /// Content that has not been committed as delivered, ordered by schedule.
    async fn list_undelivered(&self) -> crate::Result<Vec<Content>>;

    /// Conditionally mark the row as being delivered.
    ///
    /// Succeeds only while `delivered` is false and no other claim younger
    /// than `lease` exists.
    async fn claim_delivery(&self, id: ContentId, lease: Duration) -> crate::Result<ClaimOutcome>;

    /// Drop a claim without delivering.
    async fn release_claim(&self, id: ContentId) -> crate::Result<()>;

    /// Commit the terminal delivered state and clear the claim.
    ///
    /// Returns `false` if the row had already been committed.
    async fn mark_delivered(&self, id: ContentId) -> crate::Result<bool>;

    /// Addresses already mailed for this content.
    async fn sent_recipients(&self, content_id: ContentId) -> crate::Result<HashSet<String>>;

    /// Remember that `email` was mailed for this content.
    async fn record_sent(&self, content_id: ContentId, email: &str) -> crate::Result<()>;
}

/// Whether a claim taken at `claimed_at` still blocks others at `now`.
pub(crate) fn claim_is_live(claimed_at: DateTime<Utc>, now: DateTime<Utc>, lease: Duration) -> bool {
    now - claimed_at < lease
}
