//! Job spool implementations
//!
//! - `file`: one file per job in a spool directory, safe across processes
//! - `memory`: in-process map for tests and development

pub mod file;
pub mod memory;

pub use file::FileJobSpool;
pub use memory::MemoryJobSpool;
