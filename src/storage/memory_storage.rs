//! In-memory storage backend.
//!
//! Keeps everything in maps behind one mutex and counts writes, which makes
//! it the backend of choice for tests that assert how often a save actually
//! reached storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{GameSummary, RowId};

#[derive(Default)]
struct Tables {
    games: BTreeMap<RowId, Vec<u8>>,
    summaries: HashMap<RowId, GameSummary>,
    names: HashMap<RowId, String>,
    settings: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    game_writes: AtomicUsize,
    summary_writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_game` calls that succeeded.
    pub fn game_writes(&self) -> usize {
        self.game_writes.load(Ordering::SeqCst)
    }

    /// Number of `save_summary` calls that succeeded.
    pub fn summary_writes(&self) -> usize {
        self.summary_writes.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn save_game(&self, rowid: RowId, stream: &[u8]) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::WriteFailed)?;
        tables.games.insert(rowid, stream.to_vec());
        self.game_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_game(&self, rowid: RowId) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self.tables.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(tables.games.get(&rowid).cloned())
    }

    fn delete_game(&self, rowid: RowId) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::WriteFailed)?;
        tables.games.remove(&rowid);
        tables.summaries.remove(&rowid);
        tables.names.remove(&rowid);
        Ok(())
    }

    fn list_games(&self) -> Result<Vec<RowId>, StorageError> {
        let tables = self.tables.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(tables.games.keys().copied().collect())
    }

    fn save_summary(&self, rowid: RowId, summary: &GameSummary) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::WriteFailed)?;
        tables.summaries.insert(rowid, summary.clone());
        self.summary_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_summary(&self, rowid: RowId) -> Result<Option<GameSummary>, StorageError> {
        let tables = self.tables.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(tables.summaries.get(&rowid).cloned())
    }

    fn set_name(&self, rowid: RowId, name: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::WriteFailed)?;
        tables.names.insert(rowid, name.to_string());
        Ok(())
    }

    fn get_name(&self, rowid: RowId) -> Result<Option<String>, StorageError> {
        let tables = self.tables.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(tables.names.get(&rowid).cloned())
    }

    fn set_string_for(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().map_err(|_| StorageError::WriteFailed)?;
        tables.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string_for(&self, key: &str) -> Result<Option<String>, StorageError> {
        let tables = self.tables.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(tables.settings.get(key).cloned())
    }
}
