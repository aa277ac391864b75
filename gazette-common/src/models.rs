//! Records shared between the store, the delivery core and the newsroom.
//!
//! Identifiers are thin newtypes over the store's row ids so a topic id can
//! never be passed where a content id is expected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of a [`Topic`]
    TopicId
);
row_id!(
    /// Identifier of a [`Subscriber`]
    SubscriberId
);
row_id!(
    /// Identifier of a [`Content`] item
    ContentId
);

/// Longest topic name the store accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 100;

/// A named newsletter channel that subscribers join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub description: Option<String>,
}

/// An email address subscribed to exactly one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: String,
    pub topic_id: TopicId,
    pub created_at: DateTime<Utc>,
}

/// A newsletter issue scheduled for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub topic_id: TopicId,
    pub content_text: String,
    pub scheduled_time: DateTime<Utc>,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    /// Set while a delivery holds the row
    pub claimed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Where a content item sits in the delivery lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    Pending,
    Delivering,
    Delivered,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
        })
    }
}

impl Content {
    /// Derive the lifecycle state, treating claims older than `lease` as expired.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>, lease: Duration) -> DeliveryState {
        if self.delivered {
            return DeliveryState::Delivered;
        }

        match self.claimed_at {
            Some(claimed_at) if now - claimed_at < lease => DeliveryState::Delivering,
            _ => DeliveryState::Pending,
        }
    }

    /// Whether the scheduled time has been reached
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }
}

/// Input for creating a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContent {
    pub topic_id: TopicId,
    pub content_text: String,
    pub scheduled_time: DateTime<Utc>,
}
