//! Durable storage for topics, subscribers and newsletter content.
//!
//! The delivery core only talks to [`RecordStore`]; which backend sits behind
//! it is decided by [`StoreConfig`] at startup.

pub mod backends;
pub mod config;
pub mod error;
pub mod store;

pub use backends::{MemoryRecordStore, SqliteRecordStore, TestRecordStore, test::Failpoint};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{ClaimOutcome, RecordStore};
