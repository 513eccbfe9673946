//! Dictionary loading.
//!
//! Dictionaries are opaque byte buffers to this layer; the engine parses
//! them. They live in one directory as `<name>.xwd`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

pub const DICT_EXTENSION: &str = "xwd";

/// Dictionaries opened for one game, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictPairs {
    dicts: BTreeMap<String, Vec<u8>>,
}

impl DictPairs {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.dicts.get(name).map(|bytes| bytes.as_slice())
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, bytes: Vec<u8>) {
        self.dicts.insert(name.into(), bytes);
    }

    pub fn names(&self) -> Vec<String> {
        self.dicts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dicts.is_empty()
    }
}

pub struct DictStore {
    dir: PathBuf,
}

impl DictStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, DICT_EXTENSION))
    }

    /// Opens every named dictionary that can be read. Unreadable ones are
    /// simply absent from the result.
    pub fn open(&self, names: &[String]) -> DictPairs {
        let mut pairs = DictPairs::default();
        for name in names {
            match fs::read(self.path_for(name)) {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!("Opened dictionary {} ({} bytes)", name, bytes.len());
                    pairs.insert(name.clone(), bytes);
                }
                Ok(_) => warn!("Dictionary {} is empty", name),
                Err(e) => warn!("Unable to open dictionary {}: {}", name, e),
            }
        }
        pairs
    }

    /// Names from `names` that `pairs` doesn't hold.
    pub fn missing(names: &[String], pairs: &DictPairs) -> Vec<String> {
        names
            .iter()
            .filter(|name| pairs.get(name).is_none())
            .cloned()
            .collect()
    }

    pub fn any_missing(names: &[String], pairs: &DictPairs) -> bool {
        !Self::missing(names, pairs).is_empty()
    }

    /// Names of every dictionary in the directory, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(DICT_EXTENSION))
                .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
                .collect(),
            Err(e) => {
                warn!("Unable to list {}: {}", self.dir.display(), e);
                Vec::new()
            }
        };
        names.sort();
        names
    }
}
