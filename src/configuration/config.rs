use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, LevelFilter};
use serde::Deserialize;

use super::types::CommonPrefs;
use crate::error_handling::types::ConfigError;

/// Longest a caller may wait for a game lock.
pub const MAX_LOCK_WAIT_MS: u64 = 1000;

/// Application configuration structure that defines all runtime parameters.
///
/// Loaded from a TOML file:
///
/// ```toml
/// log_level = "debug"
///
/// [storage]
/// path = "/var/lib/xwords"
///
/// [dictionaries]
/// dir = "/usr/share/xwords/dicts"
///
/// [session]
/// save_on_release = true
/// lock_timeout_ms = 500
///
/// [push]
/// ignore_fcm = false
/// ```
///
/// # Fields Overview
///
/// - `storage`: where games, summaries and settings are persisted
/// - `dictionaries`: directory dictionaries are opened from when a game is configured
/// - `session`: session lifecycle knobs and device-wide engine preferences
/// - `push`: push-notification routing switches
/// - `log_level`: default filter for the logger, overridable by `RUST_LOG`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub dictionaries: DictionaryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Persist state when the last reference to a session is released.
    #[serde(default = "default_true")]
    pub save_on_release: bool,
    /// How long to wait for a game lock before giving up.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub prefs: CommonPrefs,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_on_release: true,
            lock_timeout_ms: default_lock_timeout_ms(),
            prefs: CommonPrefs::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    /// Drop every inbound push payload unread.
    #[serde(default)]
    pub ignore_fcm: bool,
    /// Title used for remote notifications that don't carry one.
    #[serde(default)]
    pub default_title: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reads, parses and validates a configuration file.
    ///
    /// `XWS_STORAGE_DIR`, when set, replaces `storage.path`.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        info!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Ok(dir) = std::env::var("XWS_STORAGE_DIR") {
            debug!("Storage path overridden by XWS_STORAGE_DIR: {}", dir);
            config.storage.path = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Checks values that parse but can't be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // the storage dir itself is created on demand, its parent must exist
        if let Some(parent) = self.storage.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::DirectoryDoesNotExist(format!(
                    "storage parent {}",
                    parent.display()
                )));
            }
        }
        if !self.dictionaries.dir.is_dir() {
            return Err(ConfigError::DirectoryDoesNotExist(format!(
                "dictionaries {}",
                self.dictionaries.dir.display()
            )));
        }
        if self.session.lock_timeout_ms == 0 || self.session.lock_timeout_ms > MAX_LOCK_WAIT_MS {
            return Err(ConfigError::NotInRange(format!(
                "session.lock_timeout_ms = {} (expected 1..={})",
                self.session.lock_timeout_ms, MAX_LOCK_WAIT_MS
            )));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::BadLogLevel(self.log_level.clone()))
    }
}
