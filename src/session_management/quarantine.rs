//! Bookkeeping for games that keep failing to open.
//!
//! Every open is recorded, and so is every clean close. A game with too many
//! opens that never closed (the process died with it open) or whose
//! initialization failed is refused by `safe_to_open`. When backed by a
//! `Storage`, the table survives restarts under the `quarantine` key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::storage::storage_trait::Storage;
use crate::storage::types::RowId;

/// Unclean opens tolerated before a game is refused.
pub const MAX_UNCLEAN_OPENS: u32 = 2;

const STORAGE_KEY: &str = "quarantine";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    unclean_opens: u32,
    marked_bad: bool,
}

pub struct Quarantine {
    entries: Mutex<HashMap<RowId, Entry>>,
    storage: Option<Arc<dyn Storage>>,
}

impl Quarantine {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            storage: None,
        }
    }

    /// Loads the persisted table. An unreadable table starts empty.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let entries = match storage.get_string_for(STORAGE_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Discarding unreadable quarantine table: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Unable to read quarantine table: {}", e);
                HashMap::new()
            }
        };
        Self {
            entries: Mutex::new(entries),
            storage: Some(storage),
        }
    }

    fn update<F: FnOnce(&mut Entry)>(&self, rowid: RowId, f: F) {
        let Ok(mut entries) = self.entries.lock() else {
            error!("[{}] quarantine table poisoned", rowid);
            return;
        };
        let entry = entries.entry(rowid).or_default();
        f(entry);
        if *entry == Entry::default() {
            entries.remove(&rowid);
        }
        self.persist(&entries);
    }

    fn persist(&self, entries: &HashMap<RowId, Entry>) {
        let Some(storage) = &self.storage else {
            return;
        };
        match serde_json::to_string(entries) {
            Ok(json) => {
                if let Err(e) = storage.set_string_for(STORAGE_KEY, &json) {
                    warn!("Unable to persist quarantine table: {}", e);
                }
            }
            Err(e) => warn!("Unable to encode quarantine table: {}", e),
        }
    }

    pub fn record_opened(&self, rowid: RowId) {
        self.update(rowid, |entry| entry.unclean_opens += 1);
        debug!("[{}] recorded open", rowid);
    }

    /// A clean close forgives earlier unclean opens but not a bad mark.
    pub fn record_closed(&self, rowid: RowId) {
        self.update(rowid, |entry| entry.unclean_opens = 0);
        debug!("[{}] recorded close", rowid);
    }

    pub fn mark_bad(&self, rowid: RowId) {
        warn!("[{}] marking game bad", rowid);
        self.update(rowid, |entry| entry.marked_bad = true);
    }

    /// Forgets everything about `rowid`, e.g. after the game is deleted.
    pub fn clear(&self, rowid: RowId) {
        self.update(rowid, |entry| *entry = Entry::default());
    }

    pub fn safe_to_open(&self, rowid: RowId) -> bool {
        let entry = match self.entries.lock() {
            Ok(entries) => entries.get(&rowid).copied().unwrap_or_default(),
            Err(_) => return false,
        };
        !entry.marked_bad && entry.unclean_opens < MAX_UNCLEAN_OPENS
    }
}
