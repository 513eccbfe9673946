use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, error, info};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{GameSummary, RowId};

const GAME_EXT: &str = "xwg";

/// Filesystem-backed storage.
///
/// Layout under `base_path`:
/// - `games/<rowid>.xwg` raw engine stream
/// - `summaries/<rowid>.json`
/// - `names/<rowid>.txt`
/// - `settings.json` string key/value pairs
///
/// Each file is written to a temporary sibling and renamed into place so a
/// crash mid-write never leaves a truncated stream behind.
pub struct FileStorage {
    base_path: PathBuf,
    settings: Mutex<()>,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        for dir in ["games", "summaries", "names"] {
            let path = base_path.join(dir);
            fs::create_dir_all(&path).map_err(|e| {
                error!("Failed to create {} dir {}: {}", dir, path.display(), e);
                StorageError::WriteFailed
            })?;
        }
        info!("FileStorage initialized at {}", base_path.display());

        Ok(Self {
            base_path,
            settings: Mutex::new(()),
        })
    }

    fn game_path(&self, rowid: RowId) -> PathBuf {
        self.base_path.join("games").join(format!("{}.{}", rowid, GAME_EXT))
    }

    fn summary_path(&self, rowid: RowId) -> PathBuf {
        self.base_path.join("summaries").join(format!("{}.json", rowid))
    }

    fn name_path(&self, rowid: RowId) -> PathBuf {
        self.base_path.join("names").join(format!("{}.txt", rowid))
    }

    fn settings_path(&self) -> PathBuf {
        self.base_path.join("settings.json")
    }

    fn write_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let tmp = path.with_extension("tmp");
        let mut f = File::create(&tmp).map_err(|e| {
            error!("Create failed {}: {}", tmp.display(), e);
            StorageError::WriteFailed
        })?;
        f.write_all(data).and_then(|_| f.sync_all()).map_err(|e| {
            error!("Write failed {}: {}", tmp.display(), e);
            StorageError::WriteFailed
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            error!("Rename failed {} -> {}: {}", tmp.display(), path.display(), e);
            StorageError::WriteFailed
        })?;
        debug!("Wrote {} byte(s) to {}", data.len(), path.display());
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        let mut buf = Vec::new();
        match File::open(path) {
            Ok(mut f) => {
                f.read_to_end(&mut buf).map_err(|e| {
                    error!("Read failed {}: {}", path.display(), e);
                    StorageError::ReadFailed
                })?;
                Ok(Some(buf))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Open failed {}: {}", path.display(), e);
                Err(StorageError::ReadFailed)
            }
        }
    }

    fn remove_if_present(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Remove failed {}: {}", path.display(), e);
                Err(StorageError::WriteFailed)
            }
        }
    }

    fn load_settings(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match Self::read_file(&self.settings_path())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupt(format!("settings.json: {}", e))),
            None => Ok(BTreeMap::new()),
        }
    }
}

impl Storage for FileStorage {
    fn save_game(&self, rowid: RowId, stream: &[u8]) -> Result<(), StorageError> {
        Self::write_file(&self.game_path(rowid), stream)?;
        info!("[{}] Saved game stream ({} bytes)", rowid, stream.len());
        Ok(())
    }

    fn load_game(&self, rowid: RowId) -> Result<Option<Vec<u8>>, StorageError> {
        Self::read_file(&self.game_path(rowid))
    }

    fn has_game(&self, rowid: RowId) -> Result<bool, StorageError> {
        Ok(self.game_path(rowid).is_file())
    }

    fn delete_game(&self, rowid: RowId) -> Result<(), StorageError> {
        Self::remove_if_present(&self.game_path(rowid))?;
        Self::remove_if_present(&self.summary_path(rowid))?;
        Self::remove_if_present(&self.name_path(rowid))?;
        info!("[{}] Deleted game", rowid);
        Ok(())
    }

    fn list_games(&self) -> Result<Vec<RowId>, StorageError> {
        let dir = self.base_path.join("games");
        let mut rowids = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| {
            error!("Failed to read games dir {}: {}", dir.display(), e);
            StorageError::ReadFailed
        })? {
            let entry = entry.map_err(|e| {
                error!("Dir entry error: {}", e);
                StorageError::ReadFailed
            })?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(GAME_EXT) {
                continue;
            }
            if let Some(rowid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<RowId>().ok())
            {
                rowids.push(rowid);
            }
        }
        rowids.sort_unstable();
        Ok(rowids)
    }

    fn save_summary(&self, rowid: RowId, summary: &GameSummary) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(summary).map_err(|e| {
            error!("[{}] Unable to serialize summary: {}", rowid, e);
            StorageError::WriteFailed
        })?;
        Self::write_file(&self.summary_path(rowid), &json)
    }

    fn get_summary(&self, rowid: RowId) -> Result<Option<GameSummary>, StorageError> {
        match Self::read_file(&self.summary_path(rowid))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(format!("summary {}: {}", rowid, e))),
            None => Ok(None),
        }
    }

    fn set_name(&self, rowid: RowId, name: &str) -> Result<(), StorageError> {
        Self::write_file(&self.name_path(rowid), name.as_bytes())
    }

    fn get_name(&self, rowid: RowId) -> Result<Option<String>, StorageError> {
        Ok(Self::read_file(&self.name_path(rowid))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn set_string_for(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.settings.lock().map_err(|_| StorageError::WriteFailed)?;
        let mut settings = self.load_settings()?;
        settings.insert(key.to_string(), value.to_string());
        let json = serde_json::to_vec_pretty(&settings).map_err(|e| {
            error!("Unable to serialize settings: {}", e);
            StorageError::WriteFailed
        })?;
        Self::write_file(&self.settings_path(), &json)
    }

    fn get_string_for(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.settings.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(self.load_settings()?.remove(key))
    }
}
