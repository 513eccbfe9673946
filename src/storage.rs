//! Storage subsystem
//!
//! This module provides the persistence boundary for saved games.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform API.
//! - `types`: row ids and game summaries.
//! - `file_storage`: filesystem-backed implementation.
//! - `memory_storage`: in-memory implementation with write counters.

pub mod file_storage;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use storage_trait::Storage;
pub use types::{GameSummary, RowId};
