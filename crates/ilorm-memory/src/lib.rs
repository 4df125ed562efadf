//! In-memory connector for ilorm.
//!
//! `MemoryConnector` keeps each model's records in a table held in memory
//! and serves every operation of the `Connector` contract, including
//! complex query resolution for linked sub-queries. Cursors can be paced
//! through `MemoryConfig` to behave like a remote backend.

pub mod config;
pub mod connector;
pub mod cursor;
mod predicate;

pub use config::MemoryConfig;
pub use connector::{MemoryConnector, MemoryStats};
pub use cursor::MemoryCursor;
