use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gazette_common::models::{
    Content, ContentId, NewContent, NewTopic, Subscriber, SubscriberId, Topic, TopicId,
};

use crate::{
    StoreError,
    store::{ClaimOutcome, RecordStore, claim_is_live},
};

#[derive(Debug, Default)]
struct Tables {
    topics: BTreeMap<TopicId, Topic>,
    subscribers: BTreeMap<SubscriberId, Subscriber>,
    contents: BTreeMap<ContentId, Content>,
    sent: HashSet<(ContentId, String)>,
    next_id: i64,
}

impl Tables {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_topic(&self, id: TopicId) -> crate::Result<&Topic> {
        self.topics.get(&id).ok_or(StoreError::TopicNotFound(id))
    }
}

/// In-memory record store
///
/// All tables live behind a single `RwLock`, which makes every operation
/// trivially atomic. Intended for tests and for running the service without
/// a database; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the claim marker directly, bypassing the lease check.
    ///
    /// Used to simulate a crashed worker that left a claim behind.
    pub fn force_claim(
        &self,
        id: ContentId,
        claimed_at: chrono::DateTime<Utc>,
    ) -> crate::Result<()> {
        let mut tables = self.tables.write()?;
        let content = tables
            .contents
            .get_mut(&id)
            .ok_or(StoreError::ContentNotFound(id))?;
        content.claimed_at = Some(claimed_at);
        Ok(())
    }

    /// Remove a topic row while leaving its subscribers and content behind.
    ///
    /// Simulates a store without cascading deletes.
    pub fn detach_topic(&self, id: TopicId) -> crate::Result<()> {
        let mut tables = self.tables.write()?;
        tables
            .topics
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::TopicNotFound(id))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_topic(&self, topic: NewTopic) -> crate::Result<Topic> {
        let mut tables = self.tables.write()?;
        if tables.topics.values().any(|t| t.name == topic.name) {
            return Err(StoreError::TopicExists(topic.name));
        }

        let id = TopicId(tables.next_id());
        let topic = Topic {
            id,
            name: topic.name,
            description: topic.description,
        };
        tables.topics.insert(id, topic.clone());

        Ok(topic)
    }

    async fn get_topic(&self, id: TopicId) -> crate::Result<Option<Topic>> {
        Ok(self.tables.read()?.topics.get(&id).cloned())
    }

    async fn find_topic_by_name(&self, name: &str) -> crate::Result<Option<Topic>> {
        Ok(self
            .tables
            .read()?
            .topics
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn list_topics(&self) -> crate::Result<Vec<Topic>> {
        let mut topics: Vec<_> = self.tables.read()?.topics.values().cloned().collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    async fn update_topic_description(
        &self,
        id: TopicId,
        description: Option<String>,
    ) -> crate::Result<Topic> {
        let mut tables = self.tables.write()?;
        let topic = tables
            .topics
            .get_mut(&id)
            .ok_or(StoreError::TopicNotFound(id))?;
        topic.description = description;
        Ok(topic.clone())
    }

    async fn delete_topic(&self, id: TopicId) -> crate::Result<bool> {
        let mut tables = self.tables.write()?;
        if tables.topics.remove(&id).is_none() {
            return Ok(false);
        }

        tables.subscribers.retain(|_, s| s.topic_id != id);
        let removed: HashSet<ContentId> = tables
            .contents
            .values()
            .filter(|c| c.topic_id == id)
            .map(|c| c.id)
            .collect();
        tables.contents.retain(|cid, _| !removed.contains(cid));
        tables.sent.retain(|(cid, _)| !removed.contains(cid));

        Ok(true)
    }

    async fn subscribe(
        &self,
        topic_id: TopicId,
        email: &str,
    ) -> crate::Result<Option<Subscriber>> {
        let mut tables = self.tables.write()?;
        tables.require_topic(topic_id)?;

        if tables
            .subscribers
            .values()
            .any(|s| s.topic_id == topic_id && s.email == email)
        {
            return Ok(None);
        }

        let subscriber = Subscriber {
            id: SubscriberId(tables.next_id()),
            email: email.to_string(),
            topic_id,
            created_at: Utc::now(),
        };
        tables.subscribers.insert(subscriber.id, subscriber.clone());

        Ok(Some(subscriber))
    }

    async fn unsubscribe(&self, topic_id: TopicId, email: &str) -> crate::Result<bool> {
        let mut tables = self.tables.write()?;
        let before = tables.subscribers.len();
        tables
            .subscribers
            .retain(|_, s| !(s.topic_id == topic_id && s.email == email));
        Ok(tables.subscribers.len() != before)
    }

    async fn list_subscribers(&self, topic_id: TopicId) -> crate::Result<Vec<Subscriber>> {
        Ok(self
            .tables
            .read()?
            .subscribers
            .values()
            .filter(|s| s.topic_id == topic_id)
            .cloned()
            .collect())
    }

    async fn create_content(&self, content: NewContent) -> crate::Result<Content> {
        let mut tables = self.tables.write()?;
        tables.require_topic(content.topic_id)?;

        let content = Content {
            id: ContentId(tables.next_id()),
            topic_id: content.topic_id,
            content_text: content.content_text,
            scheduled_time: content.scheduled_time,
            delivered: false,
            created_at: Utc::now(),
            claimed_at: None,
            delivered_at: None,
        };
        tables.contents.insert(content.id, content.clone());

        Ok(content)
    }

    async fn get_content(&self, id: ContentId) -> crate::Result<Option<Content>> {
        Ok(self.tables.read()?.contents.get(&id).cloned())
    }

    async fn list_content(&self, topic_id: Option<TopicId>) -> crate::Result<Vec<Content>> {
        Ok(self
            .tables
            .read()?
            .contents
            .values()
            .filter(|c| topic_id.is_none_or(|t| c.topic_id == t))
            .cloned()
            .collect())
    }

    async fn list_undelivered(&self) -> crate::Result<Vec<Content>> {
        let mut pending: Vec<_> = self
            .tables
            .read()?
            .contents
            .values()
            .filter(|c| !c.delivered)
            .cloned()
            .collect();
        pending.sort_by_key(|c| (c.scheduled_time, c.id));
        Ok(pending)
    }

    async fn claim_delivery(&self, id: ContentId, lease: Duration) -> crate::Result<ClaimOutcome> {
        let mut tables = self.tables.write()?;
        let Some(content) = tables.contents.get_mut(&id) else {
            return Ok(ClaimOutcome::Missing);
        };

        if content.delivered {
            return Ok(ClaimOutcome::AlreadyDelivered);
        }

        let now = Utc::now();
        if let Some(claimed_at) = content.claimed_at
            && claim_is_live(claimed_at, now, lease)
        {
            return Ok(ClaimOutcome::InProgress { claimed_at });
        }

        content.claimed_at = Some(now);
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_claim(&self, id: ContentId) -> crate::Result<()> {
        if let Some(content) = self.tables.write()?.contents.get_mut(&id)
            && !content.delivered
        {
            content.claimed_at = None;
        }
        Ok(())
    }

    async fn mark_delivered(&self, id: ContentId) -> crate::Result<bool> {
        let mut tables = self.tables.write()?;
        let content = tables
            .contents
            .get_mut(&id)
            .ok_or(StoreError::ContentNotFound(id))?;

        if content.delivered {
            return Ok(false);
        }

        content.delivered = true;
        content.delivered_at = Some(Utc::now());
        content.claimed_at = None;
        Ok(true)
    }

    async fn sent_recipients(&self, content_id: ContentId) -> crate::Result<HashSet<String>> {
        Ok(self
            .tables
            .read()?
            .sent
            .iter()
            .filter(|(id, _)| *id == content_id)
            .map(|(_, email)| email.clone())
            .collect())
    }

    async fn record_sent(&self, content_id: ContentId, email: &str) -> crate::Result<()> {
        self.tables
            .write()?
            .sent
            .insert((content_id, email.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_topic() -> (MemoryRecordStore, Topic) {
        let store = MemoryRecordStore::new();
        let topic = store
            .create_topic(NewTopic {
                name: "weekly-digest".to_string(),
                description: None,
            })
            .await
            .expect("Failed to create topic");
        (store, topic)
    }

    #[tokio::test]
    async fn test_duplicate_topic_name_rejected() {
        let (store, _) = store_with_topic().await;
        let result = store
            .create_topic(NewTopic {
                name: "weekly-digest".to_string(),
                description: Some("again".to_string()),
            })
            .await;
        assert!(matches!(result, Err(StoreError::TopicExists(name)) if name == "weekly-digest"));
    }

    #[tokio::test]
    async fn test_resubscribe_is_noop() {
        let (store, topic) = store_with_topic().await;
        assert!(store.subscribe(topic.id, "a@x.com").await.unwrap().is_some());
        assert!(store.subscribe(topic.id, "a@x.com").await.unwrap().is_none());
        assert_eq!(store.list_subscribers(topic.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_topic_cascades() {
        let (store, topic) = store_with_topic().await;
        store.subscribe(topic.id, "a@x.com").await.unwrap();
        let content = store
            .create_content(NewContent {
                topic_id: topic.id,
                content_text: "hello".to_string(),
                scheduled_time: Utc::now(),
            })
            .await
            .unwrap();
        store.record_sent(content.id, "a@x.com").await.unwrap();

        assert!(store.delete_topic(topic.id).await.unwrap());
        assert!(store.list_subscribers(topic.id).await.unwrap().is_empty());
        assert!(store.get_content(content.id).await.unwrap().is_none());
        assert!(store.sent_recipients(content.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_blocks_until_released() {
        let (store, topic) = store_with_topic().await;
        let content = store
            .create_content(NewContent {
                topic_id: topic.id,
                content_text: "hello".to_string(),
                scheduled_time: Utc::now(),
            })
            .await
            .unwrap();
        let lease = Duration::minutes(5);

        assert_eq!(
            store.claim_delivery(content.id, lease).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert!(matches!(
            store.claim_delivery(content.id, lease).await.unwrap(),
            ClaimOutcome::InProgress { .. }
        ));

        store.release_claim(content.id).await.unwrap();
        assert_eq!(
            store.claim_delivery(content.id, lease).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }
}
