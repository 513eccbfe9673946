use std::fmt;

use crate::storage::types::RowId;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    BadLogLevel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::BadLogLevel(e) => write!(f, "Unknown log level: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    Corrupt(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::Corrupt(e) => write!(f, "Stored data is corrupt: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum LockError {
    /// Someone else holds the lock and no wait was allowed.
    Unavailable(RowId),
    /// The wait ran out before the lock was granted.
    TimedOut(RowId),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Unavailable(rowid) => write!(f, "Game {} is locked", rowid),
            LockError::TimedOut(rowid) => write!(f, "Timed out waiting for lock on game {}", rowid),
        }
    }
}

impl std::error::Error for LockError {}

#[derive(Debug)]
pub enum SessionError {
    /// A dictionary the game needs could not be opened.
    MissingDictionaries(Vec<String>),
    /// No saved game exists for the row.
    NoSavedGame(RowId),
    /// The engine refused to build a game from the saved stream.
    InitFailed(RowId),
    /// The game has been marked unsafe to open.
    Quarantined(RowId),
    NotConfigured,
    AlreadyStarted,
    HandleReleased,
    WorkerSpawnFailed(String),
    LockError(LockError),
    StorageError(StorageError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingDictionaries(names) => {
                write!(f, "Missing dictionaries: {}", names.join(", "))
            }
            SessionError::NoSavedGame(rowid) => write!(f, "No saved game for row {}", rowid),
            SessionError::InitFailed(rowid) => write!(f, "Unable to open game {}", rowid),
            SessionError::Quarantined(rowid) => write!(f, "Game {} is quarantined", rowid),
            SessionError::NotConfigured => write!(f, "Session has not been configured"),
            SessionError::AlreadyStarted => write!(f, "Session worker is already running"),
            SessionError::HandleReleased => write!(f, "Game handle used after release"),
            SessionError::WorkerSpawnFailed(e) => write!(f, "Unable to start worker: {}", e),
            SessionError::LockError(e) => write!(f, "Lock error: {}", e),
            SessionError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LockError> for SessionError {
    fn from(err: LockError) -> Self {
        SessionError::LockError(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum PushError {
    BadJson(String),
    BadBase64(String),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::BadJson(e) => write!(f, "Malformed msgs64 array: {}", e),
            PushError::BadBase64(e) => write!(f, "Malformed base64 message: {}", e),
        }
    }
}

impl std::error::Error for PushError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    SessionError(SessionError),
    StorageError(StorageError),
    PushError(PushError),
    BadCommand(String),
    GameExists(RowId),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::SessionError(e) => write!(f, "Session error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::PushError(e) => write!(f, "Push error: {}", e),
            ControllerError::BadCommand(e) => write!(f, "Unrecognized command: {}", e),
            ControllerError::GameExists(rowid) => write!(f, "Game {} already exists", rowid),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<SessionError> for ControllerError {
    fn from(err: SessionError) -> Self {
        ControllerError::SessionError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<LockError> for ControllerError {
    fn from(err: LockError) -> Self {
        ControllerError::SessionError(SessionError::LockError(err))
    }
}

impl From<PushError> for ControllerError {
    fn from(err: PushError) -> Self {
        ControllerError::PushError(err)
    }
}
