//! The per-session dispatch loop.
//!
//! A `Worker` is the only thing that touches a configured game. It pulls
//! commands off the queue one at a time, runs each against the game, and
//! redraws when a command reports a visible change. A run of identical
//! coalescable commands collapses to its last element, but only when the
//! duplicate is the very next thing queued.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, trace, warn};
use sha2::{Digest, Sha256};

use crate::configuration::types::{CommonPrefs, DeviceRole, GameConfig};
use crate::engine::handle::SessionHandle;
use crate::engine::native::NativeGame;
use crate::engine::types::{BoardDims, GameStateInfo, LayoutParams, Rect, TrayVisState};
use crate::error_handling::types::{SessionError, StorageError};
use crate::session_management::callbacks::{post, SyncedDraw, UiMessage, UiSender};
use crate::session_management::command::{Command, LayoutRequest};
use crate::session_management::game_lock::GameLock;
use crate::session_management::queue::{CommandQueue, QueueReceiver};
use crate::storage::storage_trait::Storage;
use crate::storage::types::RowId;

pub const SCORE_PCT: i32 = 150;
pub const TRAY_PCT: i32 = 200;
/// Columns handed to the engine when formatting dictionary counts.
const DICT_COUNT_COLS: u32 = 3;

pub const GAME_OVER_TITLE: &str = "Game over";
pub const FINAL_SCORES_TITLE: &str = "Final scores";

pub type SnapshotHash = [u8; 32];

pub fn snapshot_hash(stream: &[u8]) -> SnapshotHash {
    Sha256::digest(stream).into()
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// State the worker shares with its manager, each field behind its own
/// small lock so UI polling never contends with the registry.
#[derive(Default)]
pub(crate) struct SharedState {
    pub gsi: Mutex<GameStateInfo>,
    pub save_dict: Mutex<Option<String>>,
    pub conn_status: Mutex<Option<Rect>>,
}

impl SharedState {
    pub fn game_state_info(&self) -> GameStateInfo {
        guard(&self.gsi).clone()
    }

    pub fn set_save_dict(&self, dict: Option<String>) {
        *guard(&self.save_dict) = dict;
    }

    pub fn save_dict(&self) -> Option<String> {
        guard(&self.save_dict).clone()
    }

    pub fn conn_status(&self) -> Option<Rect> {
        *guard(&self.conn_status)
    }
}

/// Starts comms and gives the engine its first turn. Returns whether
/// anything changed on the board.
pub fn try_connect(rowid: RowId, game: &mut dyn NativeGame, gi: &GameConfig) -> bool {
    debug!("[{}] try_connect()", rowid);
    game.comms_start();
    if gi.role == DeviceRole::Guest {
        game.init_client_connection();
    }
    game.server_do()
}

pub(crate) struct Worker {
    rowid: RowId,
    handle: Arc<SessionHandle>,
    lock: Option<GameLock>,
    gi: GameConfig,
    prefs: CommonPrefs,
    storage: Arc<dyn Storage>,
    drawer: Box<dyn SyncedDraw>,
    ui: UiSender,
    queue: CommandQueue,
    shared: Arc<SharedState>,
    last_saved: Option<SnapshotHash>,
}

pub(crate) struct WorkerParts {
    pub rowid: RowId,
    pub handle: Arc<SessionHandle>,
    pub lock: GameLock,
    pub gi: GameConfig,
    pub prefs: CommonPrefs,
    pub storage: Arc<dyn Storage>,
    pub drawer: Box<dyn SyncedDraw>,
    pub ui: UiSender,
    pub queue: CommandQueue,
    pub shared: Arc<SharedState>,
    pub last_saved: Option<SnapshotHash>,
}

impl Worker {
    pub fn new(parts: WorkerParts) -> Self {
        Self {
            rowid: parts.rowid,
            handle: parts.handle,
            lock: Some(parts.lock),
            gi: parts.gi,
            prefs: parts.prefs,
            storage: parts.storage,
            drawer: parts.drawer,
            ui: parts.ui,
            queue: parts.queue,
            shared: parts.shared,
            last_saved: parts.last_saved,
        }
    }

    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Runs until `Stop` is dequeued or every sender is gone, then saves
    /// and gives back this worker's reference to the game.
    pub fn run(self, rx: QueueReceiver) {
        self.run_loop(rx, true)
    }

    /// Runs whatever is already queued without waiting for more, then
    /// finishes the same way as `run`. Used when a session is released before its worker
    /// thread was ever started.
    pub fn run_inline(self, rx: QueueReceiver) {
        self.run_loop(rx, false)
    }

    fn run_loop(mut self, mut rx: QueueReceiver, blocking: bool) {
        debug!("[{}] worker starting", self.rowid);
        let mut save_on_stop = false;
        loop {
            let envelope = if blocking {
                rx.next_blocking()
            } else {
                rx.next_now()
            };
            let Some(envelope) = envelope else {
                warn!("[{}] queue closed without Stop", self.rowid);
                break;
            };

            let cmd = envelope.cmd;
            let kind = cmd.kind();
            if let Command::Stop { save } = cmd {
                save_on_stop = save;
                break;
            }
            if kind.is_coalescable() && rx.next_same(kind) {
                trace!("[{}] skipping {}, another is next", self.rowid, kind);
                continue;
            }

            trace!("[{}] running {}", self.rowid, kind);
            match self.dispatch(cmd) {
                Ok(true) => {
                    if let Err(e) = self.redraw() {
                        error!("[{}] redraw after {} failed: {}", self.rowid, kind, e);
                    }
                }
                Ok(false) => {}
                Err(e) => error!("[{}] {} failed: {}", self.rowid, kind, e),
            }
        }
        self.finish(save_on_stop);
    }

    fn finish(mut self, save: bool) {
        if save {
            let handle = self.handle.clone();
            if let Err(e) = handle.with_game(|g| g.comms_stop()) {
                error!("[{}] comms_stop failed: {}", self.rowid, e);
            }
            if let Err(e) = self.save() {
                error!("[{}] final save failed: {}", self.rowid, e);
            }
        } else {
            warn!("[{}] exiting without saving", self.rowid);
        }
        self.handle.release();
        // gives back this worker's reference to the game lock
        self.lock.take();
        debug!("[{}] worker finished", self.rowid);
    }

    fn redraw(&mut self) -> Result<(), SessionError> {
        let handle = self.handle.clone();
        let drawer = &mut self.drawer;
        let state = handle.with_game(|g| {
            drawer.do_jni_draw(g);
            g.get_state()
        })?;
        *guard(&self.shared.gsi) = state;
        post(&self.ui, self.rowid, UiMessage::ToolbarStates);
        Ok(())
    }

    fn dialog(&self, title: String, text: String) {
        post(&self.ui, self.rowid, UiMessage::Dialog { title, text });
    }

    /// Runs one command. Returns whether a redraw is needed.
    fn dispatch(&mut self, cmd: Command) -> Result<bool, SessionError> {
        let handle = self.handle.clone();
        let rowid = self.rowid;
        let draw = match cmd {
            Command::None => false,
            Command::Save => {
                self.save()?;
                false
            }
            Command::Draw => true,
            Command::InvalAll => {
                handle.with_game(|g| g.inval_all())?;
                true
            }
            Command::Layout(request) => {
                match request {
                    LayoutRequest::Dims(dims) => handle.with_game(|g| g.apply_layout(&dims))?,
                    LayoutRequest::Figure {
                        width,
                        height,
                        font_width,
                        font_height,
                    } => self.do_layout(width, height, font_width, font_height)?,
                }
                // refreshes the zoom limits for the new size
                self.queue.handle(Command::Zoom(0));
                true
            }
            Command::Start => {
                let gi = &self.gi;
                handle.with_game(|g| try_connect(rowid, g, gi))?
            }
            Command::Do => handle.with_game(|g| g.server_do())?,
            Command::Receive { msg, addr } => {
                let draw = handle.with_game(|g| g.receive_message(&msg, &addr))?;
                self.queue.handle(Command::Do);
                if draw {
                    self.queue.handle(Command::Save);
                }
                draw
            }
            Command::PrefsChange => {
                let prefs = &self.prefs;
                handle.with_game(|g| {
                    // some prefs only matter to drawing, so redraw regardless
                    g.inval_all();
                    g.prefs_changed(prefs);
                })?;
                true
            }
            Command::PenDown { x, y } => handle.with_game(|g| g.pen_down(x, y))?,
            Command::PenMove { x, y } => handle.with_game(|g| g.pen_move(x, y))?,
            Command::PenUp { x, y } => handle.with_game(|g| g.pen_up(x, y))?,
            Command::TimerFired { why, when, handle: timer } => {
                handle.with_game(|g| g.timer_fired(why, when, timer))?
            }
            Command::Commit {
                phonies_confirmed,
                turn_confirmed,
                new_tiles,
            } => handle.with_game(|g| {
                g.commit_turn(phonies_confirmed, turn_confirmed, new_tiles.as_deref())
            })?,
            Command::TilesPicked { player, tiles } => {
                handle.with_game(|g| g.tiles_picked(player, &tiles))?;
                false
            }
            Command::Juggle => handle.with_game(|g| g.juggle_tray())?,
            Command::Flip => handle.with_game(|g| g.flip())?,
            Command::ToggleTray => handle.with_game(|g| {
                if g.tray_vis_state() == TrayVisState::Revealed {
                    g.hide_tray()
                } else {
                    g.show_tray()
                }
            })?,
            Command::Trade => handle.with_game(|g| g.begin_trade())?,
            Command::CancelTrade => handle.with_game(|g| g.end_trade())?,
            Command::UndoCur => {
                handle.with_game(|g| g.replace_tiles() || g.redo_replaced_tiles())?
            }
            Command::UndoLast => {
                handle.with_game(|g| g.handle_undo())?;
                true
            }
            Command::PrevHint | Command::NextHint => {
                let backwards = cmd == Command::PrevHint;
                let outcome = handle.with_game(|g| g.request_hint(false, backwards))?;
                if outcome.work_remains {
                    // ask again; drawing waits for the finished search
                    self.queue.handle(cmd);
                    false
                } else {
                    outcome.redraw
                }
            }
            Command::Zoom(by) => handle.with_game(|g| g.zoom(by))?,
            Command::CountsValues(title) => {
                let text = handle.with_game(|g| g.format_dict_counts(DICT_COUNT_COLS))?;
                self.dialog(title, text);
                false
            }
            Command::Remaining(title) => {
                let text = handle.with_game(|g| g.format_remaining_tiles())?;
                self.dialog(title, text);
                false
            }
            Command::Resend {
                force,
                filter_msg_pending,
                show,
            } => {
                let n_sent = handle.with_game(|g| g.resend_all(force, filter_msg_pending))?;
                if show {
                    post(&self.ui, rowid, UiMessage::MsgsSent(n_sent));
                }
                false
            }
            Command::History(title) => {
                let text = handle.with_game(|g| {
                    let over = g.game_is_over();
                    g.write_game_history(over)
                })?;
                self.dialog(title, text);
                false
            }
            Command::Final => {
                if handle.with_game(|g| g.game_is_over())? {
                    self.queue.handle(Command::PostOver { auto: false });
                } else {
                    post(&self.ui, rowid, UiMessage::QueryEndgame);
                }
                false
            }
            Command::EndGame => {
                handle.with_game(|g| g.end_game())?;
                true
            }
            Command::PostOver { auto } => {
                let scores = handle.with_game(|g| {
                    if g.game_is_over() {
                        Some(g.write_final_scores())
                    } else {
                        None
                    }
                })?;
                if let Some(text) = scores {
                    let title = if auto { GAME_OVER_TITLE } else { FINAL_SCORES_TITLE };
                    post(
                        &self.ui,
                        rowid,
                        UiMessage::GameOver {
                            title: title.to_string(),
                            text,
                        },
                    );
                }
                false
            }
            Command::SendChat(text) => {
                handle.with_game(|g| g.send_chat(&text))?;
                false
            }
            Command::NetStats(title) => {
                let text = handle.with_game(|g| g.comms_stats())?;
                self.dialog(title, text);
                false
            }
            Command::PassPasswd { player, pwd } => {
                handle.with_game(|g| g.password_provided(player, &pwd))?
            }
            Command::SetBlank {
                player,
                col,
                row,
                tile,
            } => handle.with_game(|g| g.set_blank_value(player, col, row, tile))?,
            Command::SetMqttId { addr_type, dev_id } => {
                handle.with_game(|g| g.add_mqtt_dev_id(addr_type, &dev_id))?;
                false
            }
            Command::Pause(msg) => {
                handle.with_game(|g| g.pause(&msg))?;
                false
            }
            Command::Unpause(msg) => {
                handle.with_game(|g| g.unpause(&msg))?;
                false
            }
            Command::Stop { .. } => {
                // the loop consumes Stop before dispatching
                warn!("[{}] Stop reached dispatch", rowid);
                false
            }
        };
        Ok(draw)
    }

    fn do_layout(
        &mut self,
        width: i32,
        height: i32,
        font_width: i32,
        font_height: i32,
    ) -> Result<(), SessionError> {
        let params = LayoutParams {
            left: 0,
            top: 0,
            width,
            height,
            score_pct: SCORE_PCT,
            tray_pct: TRAY_PCT,
            score_width: width,
            font_width,
            font_height,
            square_tiles: self.prefs.square_tiles,
        };
        let handle = self.handle.clone();
        let gi = &self.gi;
        let mut dims: BoardDims = handle.with_game(|g| g.figure_layout(gi, &params))?;

        // room for the connection status icon
        let conn_status = if self.gi.is_networked() {
            let status_width = dims.board_width / 15;
            dims.score_width -= status_width;
            let left = dims.score_left + dims.score_width + dims.timer_width;
            Some(Rect {
                left,
                top: dims.top,
                right: left + status_width,
                bottom: dims.top + dims.score_ht,
            })
        } else {
            None
        };
        *guard(&self.shared.conn_status) = conn_status;

        handle.with_game(|g| g.apply_layout(&dims))?;
        self.drawer.dims_changed(&dims);
        Ok(())
    }

    /// Persists the game unless it is unchanged since the last save.
    ///
    /// A failed serialization or storage write leaves the previous snapshot
    /// as the last saved one.
    fn save(&mut self) -> Result<(), SessionError> {
        let handle = self.handle.clone();
        let save_dict = self.shared.save_dict();
        let (gi, stream) = handle.with_game(|g| {
            // pending turn work would otherwise be lost from the snapshot
            g.server_do();
            let mut gi = g.get_gi();
            if let Some(dict) = save_dict {
                gi.dict_name = dict;
            }
            let stream = g.save_to_stream(&gi);
            (gi, stream)
        })?;
        if gi.name.is_empty() && !self.gi.name.is_empty() {
            self.gi = GameConfig {
                name: self.gi.name.clone(),
                ..gi
            };
        } else {
            self.gi = gi;
        }

        let Some(stream) = stream else {
            warn!("[{}] serialization failed; keeping previous snapshot", self.rowid);
            return Ok(());
        };
        let hash = snapshot_hash(&stream);
        if self.last_saved == Some(hash) {
            trace!("[{}] no change in game; skipping save", self.rowid);
            return Ok(());
        }

        if let Some(lock) = &self.lock {
            if !lock.can_write() {
                return Err(SessionError::StorageError(StorageError::WriteFailed));
            }
        }
        let gi = &self.gi;
        let summary = handle.with_game(|g| g.summarize(self.rowid, gi))?;
        self.storage.save_game(self.rowid, &stream)?;
        self.storage.save_summary(self.rowid, &summary)?;
        handle.with_game(|g| g.save_succeeded())?;
        self.last_saved = Some(hash);
        info!("[{}] saved {} bytes", self.rowid, stream.len());
        Ok(())
    }
}
