//! Backend implementations of [`crate::RecordStore`]
//!
//! - `memory`: in-process tables for tests and development
//! - `sqlite`: durable storage shared between processes
//! - `test`: memory tables with fault injection and synchronization hooks

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use test::TestRecordStore;
