//! Storage Trait
//!
//! This module defines the `Storage` trait, the persistence boundary of the
//! session layer.
//!
//! Implementors of this trait are responsible for:
//! - Persisting and retrieving serialized game streams, keyed by row id
//! - Persisting game summaries and display names
//! - A small string key/value store for device-wide settings
//!
//! Only single-key atomicity is expected. All methods return a `Result` to
//! handle potential storage errors.

use crate::error_handling::types::StorageError;
use crate::storage::types::{GameSummary, RowId};

/// The `Storage` trait defines the interface for game storage backends.
pub trait Storage: Send + Sync {
    /// Saves the serialized engine state for `rowid`, replacing any prior stream.
    fn save_game(&self, rowid: RowId, stream: &[u8]) -> Result<(), StorageError>;

    /// Loads the serialized engine state for `rowid`, if one was ever saved.
    fn load_game(&self, rowid: RowId) -> Result<Option<Vec<u8>>, StorageError>;

    /// Whether a stream exists for `rowid`.
    fn has_game(&self, rowid: RowId) -> Result<bool, StorageError> {
        Ok(self.load_game(rowid)?.is_some())
    }

    /// Removes everything stored for `rowid`.
    fn delete_game(&self, rowid: RowId) -> Result<(), StorageError>;

    /// Lists the row ids that have a saved stream, ascending.
    fn list_games(&self) -> Result<Vec<RowId>, StorageError>;

    fn save_summary(&self, rowid: RowId, summary: &GameSummary) -> Result<(), StorageError>;

    fn get_summary(&self, rowid: RowId) -> Result<Option<GameSummary>, StorageError>;

    fn set_name(&self, rowid: RowId, name: &str) -> Result<(), StorageError>;

    fn get_name(&self, rowid: RowId) -> Result<Option<String>, StorageError>;

    fn set_string_for(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn get_string_for(&self, key: &str) -> Result<Option<String>, StorageError>;
}
