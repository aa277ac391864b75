use std::{collections::HashSet, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gazette_common::{
    internal,
    models::{Content, ContentId, NewContent, NewTopic, Subscriber, SubscriberId, Topic, TopicId},
};
use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;

use crate::{
    StoreError,
    store::{ClaimOutcome, RecordStore},
};

const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    UNIQUE(email, topic_id)
);

CREATE INDEX IF NOT EXISTS idx_subscribers_topic_id ON subscribers(topic_id);

CREATE TABLE IF NOT EXISTS content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    content_text TEXT NOT NULL,
    scheduled_time INTEGER NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    claimed_at INTEGER,
    delivered_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_content_undelivered ON content(delivered, scheduled_time);

CREATE TABLE IF NOT EXISTS sent_recipients (
    content_id INTEGER NOT NULL REFERENCES content(id) ON DELETE CASCADE,
    email TEXT NOT NULL,
    sent_at INTEGER NOT NULL,
    PRIMARY KEY (content_id, email)
);
";

const CONTENT_COLUMNS: &str =
    "id, topic_id, content_text, scheduled_time, delivered, created_at, claimed_at, delivered_at";

/// SQLite-backed record store
///
/// Timestamps are stored as integer milliseconds since the Unix epoch so that
/// lease comparisons can happen inside a single conditional `UPDATE`. All
/// statements run on the connection's dedicated thread via
/// [`tokio_rusqlite::Connection::call`].
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore").finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open (and create if needed) the database at `path`.
    ///
    /// # Errors
    /// If the parent directory cannot be created or the schema cannot be applied
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        internal!("Opening record store at {}", path.display());
        let conn = Connection::open(path).await?;
        Self::with_connection(conn).await
    }

    /// Private in-memory database, mostly useful in tests.
    ///
    /// # Errors
    /// If the schema cannot be applied
    pub async fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> crate::Result<Self> {
        conn.call(|conn| {
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: TopicId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn subscriber_from_row(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: SubscriberId(row.get(0)?),
        email: row.get(1)?,
        topic_id: TopicId(row.get(2)?),
        created_at: from_millis(row.get(3)?)?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<Content> {
    Ok(Content {
        id: ContentId(row.get(0)?),
        topic_id: TopicId(row.get(1)?),
        content_text: row.get(2)?,
        scheduled_time: from_millis(row.get(3)?)?,
        delivered: row.get(4)?,
        created_at: from_millis(row.get(5)?)?,
        claimed_at: row
            .get::<_, Option<i64>>(6)?
            .map(from_millis)
            .transpose()?,
        delivered_at: row
            .get::<_, Option<i64>>(7)?
            .map(from_millis)
            .transpose()?,
    })
}

fn topic_exists(conn: &rusqlite::Connection, id: TopicId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM topics WHERE id = ?1)",
        params![id.get()],
        |row| row.get(0),
    )
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create_topic(&self, topic: NewTopic) -> crate::Result<Topic> {
        let name = topic.name.clone();
        let created = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO topics (name, description) VALUES (?1, ?2)",
                    params![topic.name, topic.description],
                ) {
                    Ok(_) => Ok(Some(Topic {
                        id: TopicId(conn.last_insert_rowid()),
                        name: topic.name,
                        description: topic.description,
                    })),
                    Err(e) if is_unique_violation(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        created.ok_or(StoreError::TopicExists(name))
    }

    async fn get_topic(&self, id: TopicId) -> crate::Result<Option<Topic>> {
        let topic = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, description FROM topics WHERE id = ?1",
                        params![id.get()],
                        topic_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(topic)
    }

    async fn find_topic_by_name(&self, name: &str) -> crate::Result<Option<Topic>> {
        let name = name.to_string();
        let topic = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, description FROM topics WHERE name = ?1",
                        params![name],
                        topic_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(topic)
    }

    async fn list_topics(&self) -> crate::Result<Vec<Topic>> {
        let topics = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, description FROM topics ORDER BY name")?;
                let topics = stmt
                    .query_map([], topic_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(topics)
            })
            .await?;
        Ok(topics)
    }

    async fn update_topic_description(
        &self,
        id: TopicId,
        description: Option<String>,
    ) -> crate::Result<Topic> {
        let topic = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE topics SET description = ?2 WHERE id = ?1",
                    params![id.get(), description],
                )?;
                Ok(conn
                    .query_row(
                        "SELECT id, name, description FROM topics WHERE id = ?1",
                        params![id.get()],
                        topic_from_row,
                    )
                    .optional()?)
            })
            .await?;

        topic.ok_or(StoreError::TopicNotFound(id))
    }

    async fn delete_topic(&self, id: TopicId) -> crate::Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM topics WHERE id = ?1", params![id.get()])? > 0)
            })
            .await?;
        Ok(deleted)
    }

    async fn subscribe(
        &self,
        topic_id: TopicId,
        email: &str,
    ) -> crate::Result<Option<Subscriber>> {
        let email = email.to_string();
        let created_at = Utc::now();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if !topic_exists(&tx, topic_id)? {
                    return Ok(Err(StoreError::TopicNotFound(topic_id)));
                }

                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO subscribers (email, topic_id, created_at) VALUES (?1, ?2, ?3)",
                    params![email, topic_id.get(), to_millis(created_at)],
                )?;
                let subscriber = (inserted > 0).then(|| Subscriber {
                    id: SubscriberId(tx.last_insert_rowid()),
                    email,
                    topic_id,
                    created_at,
                });
                tx.commit()?;

                Ok(Ok(subscriber))
            })
            .await?
    }

    async fn unsubscribe(&self, topic_id: TopicId, email: &str) -> crate::Result<bool> {
        let email = email.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM subscribers WHERE topic_id = ?1 AND email = ?2",
                    params![topic_id.get(), email],
                )? > 0)
            })
            .await?;
        Ok(removed)
    }

    async fn list_subscribers(&self, topic_id: TopicId) -> crate::Result<Vec<Subscriber>> {
        let subscribers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, topic_id, created_at FROM subscribers WHERE topic_id = ?1 ORDER BY id",
                )?;
                let subscribers = stmt
                    .query_map(params![topic_id.get()], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    async fn create_content(&self, content: NewContent) -> crate::Result<Content> {
        let created_at = Utc::now();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if !topic_exists(&tx, content.topic_id)? {
                    return Ok(Err(StoreError::TopicNotFound(content.topic_id)));
                }

                tx.execute(
                    "INSERT INTO content (topic_id, content_text, scheduled_time, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        content.topic_id.get(),
                        content.content_text,
                        to_millis(content.scheduled_time),
                        to_millis(created_at),
                    ],
                )?;
                let id = ContentId(tx.last_insert_rowid());
                tx.commit()?;

                Ok(Ok(Content {
                    id,
                    topic_id: content.topic_id,
                    content_text: content.content_text,
                    scheduled_time: content.scheduled_time,
                    delivered: false,
                    created_at,
                    claimed_at: None,
                    delivered_at: None,
                }))
            })
            .await?
    }

    async fn get_content(&self, id: ContentId) -> crate::Result<Option<Content>> {
        let content = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {CONTENT_COLUMNS} FROM content WHERE id = ?1"),
                        params![id.get()],
                        content_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(content)
    }

    async fn list_content(&self, topic_id: Option<TopicId>) -> crate::Result<Vec<Content>> {
        let contents = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONTENT_COLUMNS} FROM content WHERE ?1 IS NULL OR topic_id = ?1 ORDER BY id"
                ))?;
                let contents = stmt
                    .query_map(params![topic_id.map(TopicId::get)], content_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(contents)
            })
            .await?;
        Ok(contents)
    }

    async fn list_undelivered(&self) -> crate::Result<Vec<Content>> {
        let contents = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONTENT_COLUMNS} FROM content WHERE delivered = 0 ORDER BY scheduled_time, id"
                ))?;
                let contents = stmt
                    .query_map([], content_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(contents)
            })
            .await?;
        Ok(contents)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(content_id = %id))]
    async fn claim_delivery(&self, id: ContentId, lease: Duration) -> crate::Result<ClaimOutcome> {
        let now = Utc::now();
        // A lease too long to subtract never expires
        let expired_before = now
            .checked_sub_signed(lease)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

                let claimed = tx.execute(
                    "UPDATE content SET claimed_at = ?2
                     WHERE id = ?1 AND delivered = 0 AND (claimed_at IS NULL OR claimed_at <= ?3)",
                    params![id.get(), to_millis(now), to_millis(expired_before)],
                )?;

                let outcome = if claimed > 0 {
                    ClaimOutcome::Claimed
                } else {
                    let row: Option<(bool, Option<i64>)> = tx
                        .query_row(
                            "SELECT delivered, claimed_at FROM content WHERE id = ?1",
                            params![id.get()],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;

                    match row {
                        None => ClaimOutcome::Missing,
                        Some((true, _)) => ClaimOutcome::AlreadyDelivered,
                        Some((false, claimed_at)) => ClaimOutcome::InProgress {
                            claimed_at: claimed_at.map_or(Ok(now), from_millis)?,
                        },
                    }
                };
                tx.commit()?;

                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    async fn release_claim(&self, id: ContentId) -> crate::Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE content SET claimed_at = NULL WHERE id = ?1 AND delivered = 0",
                    params![id.get()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(content_id = %id))]
    async fn mark_delivered(&self, id: ContentId) -> crate::Result<bool> {
        let now = Utc::now();
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let updated = tx.execute(
                    "UPDATE content SET delivered = 1, delivered_at = ?2, claimed_at = NULL
                     WHERE id = ?1 AND delivered = 0",
                    params![id.get(), to_millis(now)],
                )?;

                let outcome = if updated > 0 {
                    Some(true)
                } else {
                    tx.query_row(
                        "SELECT 1 FROM content WHERE id = ?1",
                        params![id.get()],
                        |_| Ok(false),
                    )
                    .optional()?
                };
                tx.commit()?;

                Ok(outcome)
            })
            .await?;

        outcome.ok_or(StoreError::ContentNotFound(id))
    }

    async fn sent_recipients(&self, content_id: ContentId) -> crate::Result<HashSet<String>> {
        let sent = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT email FROM sent_recipients WHERE content_id = ?1")?;
                let sent = stmt
                    .query_map(params![content_id.get()], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<String>, _>>()?;
                Ok(sent)
            })
            .await?;
        Ok(sent)
    }

    async fn record_sent(&self, content_id: ContentId, email: &str) -> crate::Result<()> {
        let email = email.to_string();
        let sent_at = Utc::now();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO sent_recipients (content_id, email, sent_at) VALUES (?1, ?2, ?3)",
                    params![content_id.get(), email, to_millis(sent_at)],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_topic_maps_to_topic_exists() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let new = NewTopic {
            name: "weekly-digest".to_string(),
            description: None,
        };
        store.create_topic(new.clone()).await.unwrap();

        let err = store.create_topic(new).await.unwrap_err();
        assert!(matches!(err, StoreError::TopicExists(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timestamps_round_trip_at_millisecond_precision() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let topic = store
            .create_topic(NewTopic {
                name: "t".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let scheduled = DateTime::from_timestamp_millis(1_900_000_000_123).unwrap();
        let created = store
            .create_content(NewContent {
                topic_id: topic.id,
                content_text: "body".to_string(),
                scheduled_time: scheduled,
            })
            .await
            .unwrap();

        let read = store.get_content(created.id).await.unwrap().unwrap();
        assert_eq!(read.scheduled_time, scheduled);
        assert!(!read.delivered);
        assert_eq!(read.claimed_at, None);
    }

    #[tokio::test]
    async fn test_unbounded_lease_never_expires() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let topic = store
            .create_topic(NewTopic {
                name: "t".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let content = store
            .create_content(NewContent {
                topic_id: topic.id,
                content_text: "body".to_string(),
                scheduled_time: Utc::now(),
            })
            .await
            .unwrap();
        let lease = Duration::try_seconds(9_000_000_000_000).unwrap();

        assert_eq!(
            store.claim_delivery(content.id, lease).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert!(matches!(
            store.claim_delivery(content.id, lease).await.unwrap(),
            ClaimOutcome::InProgress { .. }
        ));
    }
}
