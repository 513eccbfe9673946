use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::configuration::config::Config;
use crate::configuration::types::{DeviceRole, GameConfig};
use crate::engine::dictionary::DictStore;
use crate::engine::native::Engine;
use crate::engine::sim_engine::SimEngine;
use crate::engine::types::CommsAddr;
use crate::error_handling::types::*;
use crate::push::{route_push, PushHandler, PushOutcome};
use crate::session_management::{
    Command, GameLockTable, NullDrawer, Quarantine, SessionContext, SessionManager,
    SessionRegistry, UiMessage,
};
use crate::storage::{FileStorage, GameSummary, RowId, Storage};

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Action {
    Create {
        rowid: RowId,
        name: Option<String>,
        dict: String,
        role: DeviceRole,
    },
    Play {
        rowid: RowId,
        cmds: Vec<String>,
    },
    Status {
        rowid: RowId,
    },
    Push {
        file: PathBuf,
    },
}

/// Wires storage, dictionaries, the engine and the session registry
/// together from a `Config`, and runs one `Action` against them.
pub struct Controller {
    pub config: Config,
    storage: Arc<dyn Storage>,
    engine: Arc<dyn Engine>,
    quarantine: Arc<Quarantine>,
    registry: Arc<SessionRegistry>,
    lock_timeout: Duration,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Creating controller");

        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&config.storage.path)?);
        let dicts = Arc::new(DictStore::new(&config.dictionaries.dir));
        debug!("Dictionaries available: {:?}", dicts.list());
        let quarantine = Arc::new(Quarantine::load(storage.clone()));
        let engine: Arc<dyn Engine> = Arc::new(SimEngine::new());

        let ctx = SessionContext {
            engine: engine.clone(),
            storage: storage.clone(),
            dicts,
            quarantine: quarantine.clone(),
            prefs: config.session.prefs.clone(),
            save_on_release: config.session.save_on_release,
        };
        let lock_timeout = Duration::from_millis(config.session.lock_timeout_ms);
        let registry = Arc::new(SessionRegistry::new(
            ctx,
            Arc::new(GameLockTable::new()),
            lock_timeout,
        ));

        Ok(Self {
            config,
            storage,
            engine,
            quarantine,
            registry,
            lock_timeout,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Runs `action`, printing its results to stdout.
    pub async fn run(self, action: Action) -> Result<(), ControllerError> {
        info!("Running {:?}", action);
        match action {
            Action::Create {
                rowid,
                name,
                dict,
                role,
            } => {
                self.create_game(rowid, name.as_deref(), &dict, role)?;
                println!("created game {}", rowid);
            }
            Action::Play { rowid, cmds } => {
                // sessions block on their worker threads
                let msgs = tokio::task::spawn_blocking(move || self.play(rowid, &cmds))
                    .await
                    .map_err(|e| ControllerError::InitializationFailed(e.to_string()))??;
                for msg in msgs {
                    print_json(&msg);
                }
            }
            Action::Status { rowid } => match self.status(rowid)? {
                Some(summary) => print_json(&summary),
                None => println!("no summary for game {}", rowid),
            },
            Action::Push { file } => {
                let outcome = tokio::task::spawn_blocking(move || self.push_file(&file))
                    .await
                    .map_err(|e| ControllerError::InitializationFailed(e.to_string()))??;
                print_json(&outcome);
            }
        }
        Ok(())
    }

    /// Makes a new game and stores it under `rowid`.
    ///
    /// Holds the game's exclusive lock while writing, so a session can't
    /// open a half-written game.
    pub fn create_game(
        &self,
        rowid: RowId,
        name: Option<&str>,
        dict: &str,
        role: DeviceRole,
    ) -> Result<(), ControllerError> {
        let lock = self.registry.locks().lock(rowid, self.lock_timeout)?;
        if self.storage.has_game(rowid)? {
            return Err(ControllerError::GameExists(rowid));
        }
        if !lock.can_write() {
            return Err(StorageError::WriteFailed.into());
        }
        let mut gi = GameConfig::new(dict, role);
        if let Some(name) = name {
            gi.name = name.to_string();
        }
        let stream = self.engine.make_new_game(&gi).ok_or_else(|| {
            ControllerError::InitializationFailed(format!("engine refused game {}", rowid))
        })?;
        self.storage.save_game(rowid, &stream)?;
        if let Some(name) = name {
            self.storage.set_name(rowid, name)?;
        }
        // a reused row id starts with a clean record
        self.quarantine.clear(rowid);
        lock.release();
        info!("[{}] created {:?} game using {}", rowid, role, dict);
        Ok(())
    }

    /// Opens `rowid`, runs the textual commands through its session and
    /// closes it again. Returns everything the session told its UI.
    ///
    /// Blocks until the session's worker has finished.
    pub fn play(&self, rowid: RowId, cmds: &[String]) -> Result<Vec<UiMessage>, ControllerError> {
        let cmds = cmds
            .iter()
            .map(|c| c.parse::<Command>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ControllerError::BadCommand)?;

        let (manager, mut rx) = self.open_session(rowid)?;
        for cmd in cmds {
            manager.handle(cmd);
        }
        manager.release(true);

        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        Ok(msgs)
    }

    /// Opens, configures and starts a session. The caller owns the returned
    /// reference.
    fn open_session(
        &self,
        rowid: RowId,
    ) -> Result<(Arc<SessionManager>, mpsc::UnboundedReceiver<UiMessage>), ControllerError> {
        let manager = self
            .registry
            .get_retained(rowid, true)?
            .ok_or(SessionError::NoSavedGame(rowid))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let started = manager
            .configure(Box::new(NullDrawer), tx)
            .and_then(|_| manager.start_once());
        if let Err(e) = started {
            error!("[{}] unable to open: {}", rowid, e);
            manager.release(false);
            return Err(e.into());
        }
        Ok((manager, rx))
    }

    /// Reads the stored summary under a shared read-only lock, waiting out
    /// a session that is still writing it.
    pub fn status(&self, rowid: RowId) -> Result<Option<GameSummary>, ControllerError> {
        let lock = self.registry.locks().lock_ro(rowid, self.lock_timeout)?;
        let summary = self.storage.get_summary(rowid)?;
        lock.release();
        Ok(summary)
    }

    /// Routes a push payload read from a JSON object of string values.
    pub fn push_file(&self, path: &Path) -> Result<PushOutcome, ControllerError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;
        let payload: HashMap<String, String> =
            serde_json::from_str(&text).map_err(|e| PushError::BadJson(e.to_string()))?;
        Ok(route_push(&payload, &self.config.push, self))
    }
}

impl PushHandler for Controller {
    /// `connname` is the row id of the game the messages are for.
    fn process_game_msgs(&self, connname: &str, msgs: Vec<Vec<u8>>) {
        let rowid = match connname.parse::<RowId>() {
            Ok(rowid) => rowid,
            Err(_) => {
                warn!("No game for connname {}; dropping {} msgs", connname, msgs.len());
                return;
            }
        };
        match self.open_session(rowid) {
            Ok((manager, _rx)) => {
                for msg in msgs {
                    manager.receive(msg, CommsAddr::default());
                }
                manager.release(true);
            }
            Err(e) => warn!("[{}] dropping pushed msgs: {}", rowid, e),
        }
    }

    fn process_dev_msgs(&self, msgs: Vec<Vec<u8>>) {
        info!("Got {} device msgs; no device handler", msgs.len());
    }

    fn check_versions(&self) {
        info!("Version check requested");
    }

    fn fetch_moves(&self) {
        info!("Move fetch requested; open games: {:?}", self.registry.open_rowids());
    }

    fn mqtt_wakeup(&self) {
        info!("MQTT wakeup requested");
    }

    fn post_notification(&self, title: &str, teaser: &str, msg: &str) {
        println!("{}: {}", title, teaser);
        debug!("notification body: {}", msg);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Unable to serialize output: {}", e),
    }
}
