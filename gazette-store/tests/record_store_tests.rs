#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use gazette_common::models::{ContentId, NewContent, NewTopic, TopicId};
use gazette_store::{
    ClaimOutcome, MemoryRecordStore, RecordStore, SqliteRecordStore, StoreError,
};

async fn backends() -> Vec<(&'static str, Arc<dyn RecordStore>)> {
    vec![
        ("memory", Arc::new(MemoryRecordStore::new())),
        (
            "sqlite",
            Arc::new(
                SqliteRecordStore::open_in_memory()
                    .await
                    .expect("Failed to open sqlite"),
            ),
        ),
    ]
}

async fn seed(store: &dyn RecordStore) -> (TopicId, ContentId) {
    let topic = store
        .create_topic(NewTopic {
            name: "weekly-digest".to_string(),
            description: Some("Every monday".to_string()),
        })
        .await
        .expect("Failed to create topic");

    let content = store
        .create_content(NewContent {
            topic_id: topic.id,
            content_text: "This week in review".to_string(),
            scheduled_time: Utc::now() + Duration::hours(1),
        })
        .await
        .expect("Failed to create content");

    (topic.id, content.id)
}

#[tokio::test]
async fn test_subscription_rules() {
    for (name, store) in backends().await {
        let (topic, _) = seed(store.as_ref()).await;

        let first = store.subscribe(topic, "a@x.com").await.unwrap();
        assert!(first.is_some(), "{name}: first subscribe creates a row");
        let again = store.subscribe(topic, "a@x.com").await.unwrap();
        assert!(again.is_none(), "{name}: resubscribe is a no-op");
        store.subscribe(topic, "b@x.com").await.unwrap();

        let emails: Vec<_> = store
            .list_subscribers(topic)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.email)
            .collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com"], "{name}");

        assert!(store.unsubscribe(topic, "a@x.com").await.unwrap());
        assert!(!store.unsubscribe(topic, "a@x.com").await.unwrap());
        assert_eq!(store.list_subscribers(topic).await.unwrap().len(), 1);

        let missing = store.subscribe(TopicId(9999), "c@x.com").await;
        assert!(
            matches!(missing, Err(StoreError::TopicNotFound(TopicId(9999)))),
            "{name}: subscribing to a missing topic fails"
        );
    }
}

#[tokio::test]
async fn test_content_requires_topic() {
    for (name, store) in backends().await {
        let result = store
            .create_content(NewContent {
                topic_id: TopicId(404),
                content_text: "orphan".to_string(),
                scheduled_time: Utc::now(),
            })
            .await;
        assert!(
            matches!(result, Err(StoreError::TopicNotFound(_))),
            "{name}: got {result:?}"
        );
    }
}

#[tokio::test]
async fn test_claim_lifecycle() {
    for (name, store) in backends().await {
        let (_, content) = seed(store.as_ref()).await;
        let lease = Duration::minutes(10);

        assert_eq!(
            store.claim_delivery(content, lease).await.unwrap(),
            ClaimOutcome::Claimed,
            "{name}"
        );
        assert!(
            matches!(
                store.claim_delivery(content, lease).await.unwrap(),
                ClaimOutcome::InProgress { .. }
            ),
            "{name}: a live claim blocks"
        );

        // An expired lease can be taken over
        assert_eq!(
            store.claim_delivery(content, Duration::zero()).await.unwrap(),
            ClaimOutcome::Claimed,
            "{name}"
        );

        assert!(store.mark_delivered(content).await.unwrap(), "{name}");
        assert!(!store.mark_delivered(content).await.unwrap(), "{name}");

        let stored = store.get_content(content).await.unwrap().unwrap();
        assert!(stored.delivered, "{name}");
        assert!(stored.delivered_at.is_some(), "{name}");
        assert_eq!(stored.claimed_at, None, "{name}: commit clears the claim");

        assert_eq!(
            store.claim_delivery(content, lease).await.unwrap(),
            ClaimOutcome::AlreadyDelivered,
            "{name}"
        );
        assert_eq!(
            store.claim_delivery(ContentId(404), lease).await.unwrap(),
            ClaimOutcome::Missing,
            "{name}"
        );
        assert!(matches!(
            store.mark_delivered(ContentId(404)).await,
            Err(StoreError::ContentNotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_undelivered_listing_and_ledger() {
    for (name, store) in backends().await {
        let (topic, content) = seed(store.as_ref()).await;
        let later = store
            .create_content(NewContent {
                topic_id: topic,
                content_text: "Next week".to_string(),
                scheduled_time: Utc::now() + Duration::days(7),
            })
            .await
            .unwrap();

        let pending: Vec<_> = store
            .list_undelivered()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(pending, vec![content, later.id], "{name}");

        store.record_sent(content, "a@x.com").await.unwrap();
        store.record_sent(content, "a@x.com").await.unwrap();
        let sent = store.sent_recipients(content).await.unwrap();
        assert_eq!(sent.len(), 1, "{name}");
        assert!(sent.contains("a@x.com"));

        store.mark_delivered(content).await.unwrap();
        assert_eq!(store.list_undelivered().await.unwrap().len(), 1, "{name}");
        assert_eq!(store.list_content(Some(topic)).await.unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gazette.db");

    let content = {
        let store = SqliteRecordStore::open(&path).await.unwrap();
        let (topic, content) = seed(&store).await;
        store.subscribe(topic, "a@x.com").await.unwrap();
        content
    };

    let store = SqliteRecordStore::open(&path).await.unwrap();
    let stored = store.get_content(content).await.unwrap().unwrap();
    assert!(!stored.delivered);
    assert_eq!(store.list_subscribers(stored.topic_id).await.unwrap().len(), 1);
    assert_eq!(
        store
            .find_topic_by_name("weekly-digest")
            .await
            .unwrap()
            .map(|t| t.description),
        Some(Some("Every monday".to_string()))
    );
}
