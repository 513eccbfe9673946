use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::configuration::types::{CommonPrefs, GameConfig};
use crate::engine::dictionary::DictStore;
use crate::engine::handle::SessionHandle;
use crate::engine::native::Engine;
use crate::engine::types::{CommsAddr, GameStateInfo, Rect};
use crate::error_handling::programmer_error;
use crate::error_handling::types::SessionError;
use crate::session_management::callbacks::{post, SyncedDraw, UiMessage, UiSender};
use crate::session_management::command::Command;
use crate::session_management::game_lock::GameLock;
use crate::session_management::quarantine::Quarantine;
use crate::session_management::queue::{CommandQueue, QueueReceiver};
use crate::session_management::worker::{snapshot_hash, SharedState, Worker, WorkerParts};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{GameSummary, RowId};

/// Map of live sessions, shared by the registry and its managers.
pub type SessionMap = Mutex<HashMap<RowId, Arc<SessionManager>>>;

/// Everything a session needs from the rest of the application.
///
/// # Fields Overview
///
/// - `engine`: decodes saved streams into live games
/// - `storage`: where snapshots and summaries are read and written
/// - `dicts`: where dictionaries are opened from
/// - `quarantine`: refuses games that keep failing to open
/// - `prefs`: device-wide preferences handed to the engine
/// - `save_on_release`: save when the last reference goes away
#[derive(Clone)]
pub struct SessionContext {
    pub engine: Arc<dyn Engine>,
    pub storage: Arc<dyn Storage>,
    pub dicts: Arc<DictStore>,
    pub quarantine: Arc<Quarantine>,
    pub prefs: CommonPrefs,
    pub save_on_release: bool,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Owns one game and the worker thread that runs every operation on it.
///
/// Callers never touch the game: they queue commands with `handle` or
/// `handle_background` and hear back through `UiMessage`s and the drawer.
/// Managers are obtained from a `SessionRegistry`, which guarantees at most
/// one per row id; the last `release` stops the worker, saves and frees
/// the game, then gives the game lock back.
pub struct SessionManager {
    rowid: RowId,
    ctx: SessionContext,
    queue: CommandQueue,
    receiver: Mutex<Option<QueueReceiver>>,
    /// Configured but not yet started.
    worker: Mutex<Option<Worker>>,
    /// This manager's reference to the open game; the worker holds another.
    game: Mutex<Option<Arc<SessionHandle>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    lock: Mutex<Option<GameLock>>,
    shared: Arc<SharedState>,
    ui: Mutex<Option<UiSender>>,
    gi: Mutex<Option<GameConfig>>,
    summary: Mutex<Option<GameSummary>>,
    configured: AtomicBool,
    /// Changed only while holding the registry lock.
    ref_count: AtomicI32,
    registry: Weak<SessionMap>,
}

impl SessionManager {
    pub(crate) fn new(lock: GameLock, ctx: SessionContext, registry: Weak<SessionMap>) -> Self {
        let rowid = lock.rowid();
        let (queue, receiver) = CommandQueue::new(rowid);
        debug!("[{}] new session manager", rowid);
        Self {
            rowid,
            ctx,
            queue,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            game: Mutex::new(None),
            thread: Mutex::new(None),
            lock: Mutex::new(Some(lock)),
            shared: Arc::new(SharedState::default()),
            ui: Mutex::new(None),
            gi: Mutex::new(None),
            summary: Mutex::new(None),
            configured: AtomicBool::new(false),
            ref_count: AtomicI32::new(0),
            registry,
        }
    }

    pub fn rowid(&self) -> RowId {
        self.rowid
    }

    /// Opens the saved game and binds it to `drawer` and `ui`.
    ///
    /// Fails when the game has no saved stream, is quarantined, needs a
    /// dictionary that can't be opened, or the engine refuses the stream.
    /// A manager whose configure failed must not be started.
    pub fn configure(&self, drawer: Box<dyn SyncedDraw>, ui: UiSender) -> Result<(), SessionError> {
        let rowid = self.rowid;
        if guard(&self.thread).is_some() {
            programmer_error(&format!("[{}] configure() on a running session", rowid));
            return Err(SessionError::AlreadyStarted);
        }

        // stale commands were meant for the previous game state
        if let Some(receiver) = guard(&self.receiver).as_mut() {
            let dropped = receiver.clear(rowid);
            if !dropped.is_empty() {
                info!("[{}] configure() dropped {} queued commands", rowid, dropped.len());
            }
        }

        let result = self.open_game(drawer, ui);
        debug!("[{}] configure() => {}", rowid, result.is_ok());
        result
    }

    fn open_game(&self, drawer: Box<dyn SyncedDraw>, ui: UiSender) -> Result<(), SessionError> {
        let rowid = self.rowid;
        let ctx = &self.ctx;

        if !ctx.quarantine.safe_to_open(rowid) {
            warn!("[{}] refusing to open quarantined game", rowid);
            return Err(SessionError::Quarantined(rowid));
        }
        let stream = ctx
            .storage
            .load_game(rowid)?
            .ok_or(SessionError::NoSavedGame(rowid))?;
        let mut gi = match ctx.engine.gi_from_stream(&stream) {
            Some(gi) => gi,
            None => {
                ctx.quarantine.mark_bad(rowid);
                return Err(SessionError::InitFailed(rowid));
            }
        };
        if let Some(name) = ctx.storage.get_name(rowid)? {
            gi.name = name;
        }

        let names = gi.dict_names();
        let pairs = ctx.dicts.open(&names);
        let missing = DictStore::missing(&names, &pairs);
        if !missing.is_empty() {
            warn!("[{}] missing dictionaries: {:?}", rowid, missing);
            return Err(SessionError::MissingDictionaries(missing));
        }

        *guard(&self.summary) = ctx.storage.get_summary(rowid)?;

        if let Some(previous) = guard(&self.worker).take() {
            debug!("[{}] configure(): replacing previously configured game", rowid);
            previous.handle().release();
        }
        self.release_game();

        let game = match ctx
            .engine
            .init_from_stream(rowid, &stream, &gi, &pairs, &ctx.prefs)
        {
            Some(game) => game,
            None => {
                ctx.quarantine.mark_bad(rowid);
                return Err(SessionError::InitFailed(rowid));
            }
        };
        let handle = Arc::new(SessionHandle::new(rowid, game, ctx.quarantine.clone()));

        let lock = match guard(&self.lock).as_ref() {
            Some(lock) => lock.retain(),
            None => {
                handle.release();
                programmer_error(&format!("[{}] configure() after unlock", rowid));
                return Err(SessionError::NotConfigured);
            }
        };
        handle.retain();
        *guard(&self.game) = Some(handle.clone());

        let worker = Worker::new(WorkerParts {
            rowid,
            handle,
            lock,
            gi: gi.clone(),
            prefs: ctx.prefs.clone(),
            storage: ctx.storage.clone(),
            drawer,
            ui: ui.clone(),
            queue: self.queue.clone(),
            shared: self.shared.clone(),
            last_saved: Some(snapshot_hash(&stream)),
        });
        *guard(&self.worker) = Some(worker);
        *guard(&self.ui) = Some(ui);
        *guard(&self.gi) = Some(gi);
        self.configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Starts the worker thread. Later calls do nothing.
    pub fn start_once(&self) -> Result<(), SessionError> {
        let mut thread = guard(&self.thread);
        if thread.is_some() {
            return Ok(());
        }
        let worker = guard(&self.worker).take().ok_or(SessionError::NotConfigured)?;
        let receiver = match guard(&self.receiver).take() {
            Some(receiver) => receiver,
            None => {
                programmer_error(&format!("[{}] queue receiver already taken", self.rowid));
                worker.handle().release();
                return Err(SessionError::NotConfigured);
            }
        };

        let spawned = thread::Builder::new()
            .name(format!("session-{}", self.rowid))
            .spawn(move || worker.run(receiver));
        match spawned {
            Ok(join) => {
                info!("[{}] worker started", self.rowid);
                *thread = Some(join);
                Ok(())
            }
            Err(e) => {
                error!("[{}] unable to spawn worker: {}", self.rowid, e);
                Err(SessionError::WorkerSpawnFailed(e.to_string()))
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        guard(&self.thread).is_some()
    }

    /// Queues a UI-originated command.
    pub fn handle(&self, cmd: Command) -> bool {
        self.queue.handle(cmd)
    }

    /// Queues a command that doesn't make the session `busy()`.
    pub fn handle_background(&self, cmd: Command) -> bool {
        self.queue.handle_background(cmd)
    }

    /// Whether UI-originated work is still queued.
    pub fn busy(&self) -> bool {
        self.queue.busy()
    }

    pub fn get_game_state_info(&self) -> GameStateInfo {
        self.shared.game_state_info()
    }

    /// Dictionary name to record on the next save instead of the game's own.
    pub fn set_save_dict(&self, dict: &str) {
        self.shared.set_save_dict(Some(dict.to_string()));
    }

    /// Where the connection status icon goes, for networked games.
    pub fn conn_status_rect(&self) -> Option<Rect> {
        self.shared.conn_status()
    }

    pub fn get_gi(&self) -> Option<GameConfig> {
        guard(&self.gi).clone()
    }

    /// Summary as stored when the game was configured.
    pub fn get_summary(&self) -> Option<GameSummary> {
        guard(&self.summary).clone()
    }

    pub fn receive(&self, msg: Vec<u8>, addr: CommsAddr) -> &Self {
        self.handle(Command::Receive { msg, addr });
        self
    }

    pub fn send_chat(&self, text: &str) {
        self.handle(Command::SendChat(text.to_string()));
    }

    /// Tells the UI the game was paused or unpaused elsewhere.
    pub fn notify_pause(&self, msg: &str) {
        match guard(&self.ui).as_ref() {
            Some(ui) => post(ui, self.rowid, UiMessage::GotPause(msg.to_string())),
            None => warn!("[{}] notify_pause() before configure()", self.rowid),
        }
    }

    pub fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// Caller holds the registry lock.
    pub(crate) fn retain_locked(&self) -> i32 {
        let count = self.ref_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("[{}] retain(): ref count now {}", self.rowid, count);
        count
    }

    /// Adds a reference. Pair with `release`.
    pub fn retain(self: &Arc<Self>) -> Arc<Self> {
        match self.registry.upgrade() {
            Some(map) => {
                let _sessions = guard(&*map);
                self.retain_locked();
            }
            None => {
                self.retain_locked();
            }
        }
        self.clone()
    }

    /// Drops a reference.
    ///
    /// The last release removes the session from the registry, stops the
    /// worker after it has run everything already queued, saves (when
    /// configured to), frees the game and unlocks it. Otherwise, with `save`
    /// set and the session configured, a save is queued in case the caller
    /// changed something.
    pub fn release(&self, save: bool) {
        let mut removed = None;
        let count = match self.registry.upgrade() {
            Some(map) => {
                let mut sessions = guard(&*map);
                let count = self.ref_count.fetch_sub(1, Ordering::SeqCst) - 1;
                if count == 0 {
                    let is_self = sessions
                        .get(&self.rowid)
                        .map(|m| std::ptr::eq(Arc::as_ptr(m), self))
                        .unwrap_or(false);
                    if is_self {
                        removed = sessions.remove(&self.rowid);
                    }
                }
                count
            }
            None => self.ref_count.fetch_sub(1, Ordering::SeqCst) - 1,
        };
        // dropped outside the registry lock
        drop(removed);
        debug!("[{}] release(): ref count now {}", self.rowid, count);

        if count < 0 {
            programmer_error(&format!("[{}] session released too often ({})", self.rowid, count));
        } else if count == 0 {
            self.shutdown();
        } else if save && self.is_configured() {
            self.handle(Command::Save);
        }
    }

    /// Stops the worker and waits for it without a timeout; the worker
    /// always finishes what is queued.
    fn shutdown(&self) {
        let save = self.ctx.save_on_release;
        self.queue.stop(save);

        let thread = guard(&self.thread).take();
        match thread {
            Some(join) => {
                if join.join().is_err() {
                    error!("[{}] worker panicked", self.rowid);
                }
            }
            None => {
                let worker = guard(&self.worker).take();
                let receiver = guard(&self.receiver).take();
                match (worker, receiver) {
                    (Some(worker), Some(receiver)) => worker.run_inline(receiver),
                    (Some(worker), None) => {
                        worker.handle().release();
                    }
                    _ => debug!("[{}] shutdown of unconfigured session", self.rowid),
                }
            }
        }

        self.release_game();
        self.unlock_once();
        info!("[{}] session closed", self.rowid);
    }

    /// Drops this manager's reference to the game, disposing of it unless
    /// a worker still holds its own.
    fn release_game(&self) {
        let Some(handle) = guard(&self.game).take() else {
            return;
        };
        if !handle.release() && handle.is_retained() {
            warn!(
                "[{}] game {} still referenced ({}) after close",
                self.rowid,
                handle.id(),
                handle.ref_count()
            );
        }
    }

    fn unlock_once(&self) {
        if let Some(lock) = guard(&self.lock).take() {
            lock.release();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if guard(&self.lock).is_some() {
            warn!("[{}] session dropped without being released", self.rowid);
        }
        if let Some(worker) = guard(&self.worker).take() {
            worker.handle().release();
        }
        self.release_game();
    }
}
