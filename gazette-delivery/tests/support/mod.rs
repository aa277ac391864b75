#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use gazette_common::models::{Content, NewContent, NewTopic, Topic};
use gazette_delivery::{DeliveryExecutor, ExecutorSettings};
use gazette_store::{RecordStore, TestRecordStore};
use gazette_transport::MockTransport;

pub struct Harness {
    pub store: TestRecordStore,
    pub transport: MockTransport,
    pub executor: DeliveryExecutor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ExecutorSettings::default())
    }

    pub fn with_settings(settings: ExecutorSettings) -> Self {
        Self::with_transport(MockTransport::new(), settings)
    }

    pub fn with_transport(transport: MockTransport, settings: ExecutorSettings) -> Self {
        let store = TestRecordStore::new();
        let executor = DeliveryExecutor::new(Arc::new(store.clone()), Arc::new(transport.clone()))
            .with_settings(settings);

        Self {
            store,
            transport,
            executor,
        }
    }

    /// A topic with the given subscribers, in order.
    pub async fn topic(&self, name: &str, emails: &[&str]) -> Topic {
        let topic = self
            .store
            .create_topic(NewTopic {
                name: name.to_string(),
                description: None,
            })
            .await
            .unwrap();

        for email in emails {
            self.store.subscribe(topic.id, email).await.unwrap();
        }

        topic
    }

    /// Content for `topic` scheduled an hour from now.
    pub async fn content(&self, topic: &Topic, text: &str) -> Content {
        self.store
            .create_content(NewContent {
                topic_id: topic.id,
                content_text: text.to_string(),
                scheduled_time: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, content: &Content) -> Content {
        self.store.get_content(content.id).await.unwrap().unwrap()
    }
}
