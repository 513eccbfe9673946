#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::configuration::types::{CommonPrefs, DeviceRole, GameConfig};
    use crate::engine::dictionary::{DictPairs, DictStore};
    use crate::engine::native::{Engine, NativeGame};
    use crate::engine::types::{
        BoardDims, CommsAddr, GameStateInfo, HintOutcome, LayoutParams, Rect,
    };
    use crate::error_handling::types::{SessionError, StorageError};
    use crate::session_management::callbacks::{SyncedDraw, UiMessage, UiReceiver};
    use crate::session_management::command::{Command, LayoutRequest};
    use crate::session_management::game_lock::GameLockTable;
    use crate::session_management::quarantine::Quarantine;
    use crate::session_management::registry::SessionRegistry;
    use crate::session_management::session_manager::{SessionContext, SessionManager};
    use crate::storage::storage_trait::Storage;
    use crate::storage::types::{GameSummary, RowId};
    use crate::storage::MemoryStorage;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Everything the fake engine and drawer did, in order
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        disposals: AtomicUsize,
    }

    impl Recorder {
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        /// Entries starting with any of `prefixes`.
        fn only(&self, prefixes: &[&str]) -> Vec<String> {
            self.entries()
                .into_iter()
                .filter(|e| prefixes.iter().any(|p| e.starts_with(p)))
                .collect()
        }

        fn count(&self, entry: &str) -> usize {
            self.entries().iter().filter(|e| e.as_str() == entry).count()
        }
    }

    #[derive(Serialize, Deserialize)]
    struct FakeStream {
        gi: GameConfig,
        moves: Vec<String>,
    }

    #[derive(Clone, Copy, Default)]
    struct EngineOpts {
        refuse_init: bool,
        // hint searches that report work remaining before finishing
        hint_passes: u32,
    }

    struct FakeEngine {
        rec: Arc<Recorder>,
        opts: EngineOpts,
    }

    impl Engine for FakeEngine {
        fn gi_from_stream(&self, stream: &[u8]) -> Option<GameConfig> {
            serde_json::from_slice::<FakeStream>(stream).ok().map(|s| s.gi)
        }

        fn init_from_stream(
            &self,
            _rowid: RowId,
            stream: &[u8],
            gi: &GameConfig,
            _dicts: &DictPairs,
            _prefs: &CommonPrefs,
        ) -> Option<Box<dyn NativeGame>> {
            if self.opts.refuse_init {
                return None;
            }
            let parsed: FakeStream = serde_json::from_slice(stream).ok()?;
            Some(Box::new(FakeGame {
                rec: self.rec.clone(),
                gi: gi.clone(),
                moves: parsed.moves,
                hint_passes_left: self.opts.hint_passes,
                over: false,
            }))
        }

        fn make_new_game(&self, gi: &GameConfig) -> Option<Vec<u8>> {
            serde_json::to_vec(&FakeStream {
                gi: gi.clone(),
                moves: Vec::new(),
            })
            .ok()
        }
    }

    struct FakeGame {
        rec: Arc<Recorder>,
        gi: GameConfig,
        moves: Vec<String>,
        hint_passes_left: u32,
        over: bool,
    }

    impl FakeGame {
        fn record(&mut self, entry: String, mutates: bool) {
            if mutates {
                self.moves.push(entry.clone());
            }
            self.rec.push(entry);
        }
    }

    impl Drop for FakeGame {
        fn drop(&mut self) {
            self.rec.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl NativeGame for FakeGame {
        fn save_to_stream(&mut self, gi: &GameConfig) -> Option<Vec<u8>> {
            serde_json::to_vec(&FakeStream {
                gi: gi.clone(),
                moves: self.moves.clone(),
            })
            .ok()
        }
        fn save_succeeded(&mut self) {
            self.record("save_succeeded".into(), false);
        }
        fn get_gi(&self) -> GameConfig {
            self.gi.clone()
        }
        fn summarize(&self, rowid: RowId, gi: &GameConfig) -> GameSummary {
            GameSummary {
                rowid,
                name: gi.name.clone(),
                dict_name: gi.dict_name.clone(),
                player_names: gi.player_names(),
                scores: vec![0; gi.players.len()],
                turn: Some(0),
                n_moves: self.moves.len() as u32,
                game_over: self.over,
                n_pending_messages: 0,
                last_saved: Utc::now(),
            }
        }
        fn get_state(&self) -> GameStateInfo {
            GameStateInfo {
                can_undo: !self.moves.is_empty(),
                can_rematch: self.over,
                ..Default::default()
            }
        }
        fn server_do(&mut self) -> bool {
            self.record("server_do".into(), false);
            false
        }
        fn game_is_over(&self) -> bool {
            self.over
        }
        fn end_game(&mut self) {
            self.over = true;
            self.record("end_game".into(), true);
        }
        fn write_final_scores(&self) -> String {
            "Player 1: 10".into()
        }
        fn format_dict_counts(&self, n_cols: u32) -> String {
            format!("counts in {} columns", n_cols)
        }
        fn receive_message(&mut self, msg: &[u8], _from: &CommsAddr) -> bool {
            self.record(format!("receive({})", String::from_utf8_lossy(msg)), true);
            true
        }
        fn comms_start(&mut self) {
            self.record("comms_start".into(), false);
        }
        fn comms_stop(&mut self) {
            self.record("comms_stop".into(), false);
        }
        fn init_client_connection(&mut self) {
            self.record("init_client_connection".into(), false);
        }
        fn pen_down(&mut self, x: i32, y: i32) -> bool {
            self.record(format!("pen_down({},{})", x, y), true);
            true
        }
        fn pen_move(&mut self, x: i32, y: i32) -> bool {
            self.record(format!("pen_move({},{})", x, y), true);
            true
        }
        fn pen_up(&mut self, x: i32, y: i32) -> bool {
            self.record(format!("pen_up({},{})", x, y), true);
            true
        }
        fn commit_turn(&mut self, _p: bool, _t: bool, _n: Option<&[i32]>) -> bool {
            self.record("commit".into(), true);
            true
        }
        fn figure_layout(&mut self, _gi: &GameConfig, params: &LayoutParams) -> BoardDims {
            BoardDims {
                width: params.width,
                height: params.height,
                score_width: params.score_width,
                score_ht: 30,
                board_width: params.width,
                ..Default::default()
            }
        }
        fn apply_layout(&mut self, dims: &BoardDims) {
            self.record(format!("apply_layout({})", dims.score_width), false);
        }
        fn request_hint(&mut self, _use_limits: bool, go_backwards: bool) -> HintOutcome {
            self.record(format!("hint({})", go_backwards), false);
            if self.hint_passes_left > 0 {
                self.hint_passes_left -= 1;
                HintOutcome {
                    redraw: false,
                    work_remains: true,
                }
            } else {
                HintOutcome {
                    redraw: true,
                    work_remains: false,
                }
            }
        }
        fn zoom(&mut self, by: i32) -> bool {
            self.record(format!("zoom({})", by), false);
            by != 0
        }
        fn send_chat(&mut self, text: &str) {
            self.record(format!("chat({})", text), true);
        }
    }

    struct FakeDrawer {
        rec: Arc<Recorder>,
    }

    impl SyncedDraw for FakeDrawer {
        fn do_jni_draw(&mut self, _game: &mut dyn NativeGame) {
            self.rec.push("draw".into());
        }

        fn dims_changed(&mut self, dims: &BoardDims) {
            self.rec.push(format!("dims({})", dims.width));
        }
    }

    // Fails the first `failures` game writes, then delegates
    struct FlakyStorage {
        inner: MemoryStorage,
        failures: AtomicUsize,
    }

    impl Storage for FlakyStorage {
        fn save_game(&self, rowid: RowId, stream: &[u8]) -> Result<(), StorageError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::WriteFailed);
            }
            self.inner.save_game(rowid, stream)
        }
        fn load_game(&self, rowid: RowId) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.load_game(rowid)
        }
        fn delete_game(&self, rowid: RowId) -> Result<(), StorageError> {
            self.inner.delete_game(rowid)
        }
        fn list_games(&self) -> Result<Vec<RowId>, StorageError> {
            self.inner.list_games()
        }
        fn save_summary(&self, rowid: RowId, summary: &GameSummary) -> Result<(), StorageError> {
            self.inner.save_summary(rowid, summary)
        }
        fn get_summary(&self, rowid: RowId) -> Result<Option<GameSummary>, StorageError> {
            self.inner.get_summary(rowid)
        }
        fn set_name(&self, rowid: RowId, name: &str) -> Result<(), StorageError> {
            self.inner.set_name(rowid, name)
        }
        fn get_name(&self, rowid: RowId) -> Result<Option<String>, StorageError> {
            self.inner.get_name(rowid)
        }
        fn set_string_for(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set_string_for(key, value)
        }
        fn get_string_for(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_string_for(key)
        }
    }

    struct Fixture {
        registry: SessionRegistry,
        storage: Arc<MemoryStorage>,
        rec: Arc<Recorder>,
        quarantine: Arc<Quarantine>,
        locks: Arc<GameLockTable>,
        engine: Arc<FakeEngine>,
        seeded: Cell<usize>,
        _dicts: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with(EngineOpts::default(), true)
        }

        fn with(opts: EngineOpts, save_on_release: bool) -> Self {
            Self::with_storage(opts, save_on_release, Arc::new(MemoryStorage::new()), None)
        }

        fn with_storage(
            opts: EngineOpts,
            save_on_release: bool,
            storage: Arc<MemoryStorage>,
            session_storage: Option<Arc<dyn Storage>>,
        ) -> Self {
            init_logger();
            let dicts = TempDir::new().unwrap();
            fs::write(dicts.path().join("English.xwd"), b"dict").unwrap();
            let rec = Arc::new(Recorder::default());
            let engine = Arc::new(FakeEngine {
                rec: rec.clone(),
                opts,
            });
            let quarantine = Arc::new(Quarantine::in_memory());
            let locks = Arc::new(GameLockTable::new());
            let ctx = SessionContext {
                engine: engine.clone(),
                storage: session_storage.unwrap_or_else(|| storage.clone() as Arc<dyn Storage>),
                dicts: Arc::new(DictStore::new(dicts.path())),
                quarantine: quarantine.clone(),
                prefs: CommonPrefs::default(),
                save_on_release,
            };
            Self {
                registry: SessionRegistry::new(ctx, locks.clone(), Duration::from_millis(200)),
                storage,
                rec,
                quarantine,
                locks,
                engine,
                seeded: Cell::new(0),
                _dicts: dicts,
            }
        }

        fn seed(&self, rowid: RowId, gi: &GameConfig) {
            let stream = self.engine.make_new_game(gi).unwrap();
            self.storage.save_game(rowid, &stream).unwrap();
            self.seeded.set(self.seeded.get() + 1);
        }

        fn seed_default(&self, rowid: RowId) {
            self.seed(rowid, &GameConfig::new("English", DeviceRole::Standalone));
        }

        /// Game writes made by sessions, not by seeding.
        fn writes(&self) -> usize {
            self.storage.game_writes() - self.seeded.get()
        }

        fn open(&self, rowid: RowId) -> (Arc<SessionManager>, UiReceiver) {
            let manager = self.registry.get_retained(rowid, true).unwrap().unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            manager
                .configure(Box::new(FakeDrawer { rec: self.rec.clone() }), tx)
                .unwrap();
            (manager, rx)
        }

        fn saved_moves(&self, rowid: RowId) -> Vec<String> {
            let stream = self.storage.load_game(rowid).unwrap().unwrap();
            serde_json::from_slice::<FakeStream>(&stream).unwrap().moves
        }
    }

    fn drain(rx: &mut UiReceiver) -> Vec<UiMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    fn wait_until<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_pen_burst_coalesces_then_commit_draws_once() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);

        manager.handle(Command::PenDown { x: 5, y: 5 });
        manager.handle(Command::PenMove { x: 6, y: 6 });
        manager.handle(Command::PenMove { x: 7, y: 7 });
        manager.handle(Command::PenMove { x: 8, y: 8 });
        manager.handle(Command::commit());
        manager.start_once().unwrap();
        manager.release(false);

        assert_eq!(
            fx.rec.only(&["pen_", "commit", "draw"]),
            vec!["pen_down(5,5)", "draw", "pen_move(8,8)", "draw", "commit", "draw"]
        );
    }

    #[test]
    fn test_coalescing_matches_full_execution() {
        // same burst, once coalesced and once run one at a time
        let coalesced = Fixture::new();
        coalesced.seed_default(1);
        let (manager, _rx) = coalesced.open(1);
        for i in 0..10 {
            manager.handle(Command::PenMove { x: i, y: i });
        }
        manager.handle(Command::PenUp { x: 9, y: 9 });
        manager.start_once().unwrap();
        manager.release(false);

        let stepped = Fixture::new();
        stepped.seed_default(1);
        let (manager, _rx) = stepped.open(1);
        manager.start_once().unwrap();
        for i in 0..10 {
            manager.handle(Command::PenMove { x: i, y: i });
            wait_until(|| !manager.busy());
        }
        manager.handle(Command::PenUp { x: 9, y: 9 });
        manager.release(false);

        let last = |rec: &Recorder| rec.only(&["pen_move"]).last().cloned();
        assert_eq!(last(&coalesced.rec), last(&stepped.rec));
        assert_eq!(coalesced.rec.only(&["pen_move"]).len(), 1);
        assert_eq!(stepped.rec.only(&["pen_move"]).len(), 10);
        assert_eq!(
            coalesced.rec.only(&["pen_up"]),
            stepped.rec.only(&["pen_up"])
        );
    }

    #[test]
    fn test_coalescing_only_looks_one_ahead() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::Draw);
        manager.handle(Command::Zoom(0));
        manager.handle(Command::Draw);
        manager.handle(Command::Draw);
        manager.handle(Command::Draw);
        manager.start_once().unwrap();
        manager.release(false);

        // first Draw isn't followed by a Draw; the last three collapse
        assert_eq!(fx.rec.only(&["draw", "zoom"]), vec!["draw", "zoom(0)", "draw"]);
    }

    #[test]
    fn test_distinct_commands_run_in_order() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::PenDown { x: 1, y: 1 });
        manager.handle_background(Command::Zoom(0));
        manager.handle(Command::PenUp { x: 1, y: 1 });
        manager.handle_background(Command::SendChat("hi".into()));
        manager.handle(Command::commit());
        manager.start_once().unwrap();
        manager.release(false);

        assert_eq!(
            fx.rec.only(&["pen_", "zoom", "chat", "commit"]),
            vec!["pen_down(1,1)", "zoom(0)", "pen_up(1,1)", "chat(hi)", "commit"]
        );
    }

    #[test]
    fn test_save_twice_writes_once() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::Save);
        manager.handle(Command::PenDown { x: 2, y: 3 });
        manager.handle(Command::Save);
        manager.handle(Command::Zoom(0));
        manager.handle(Command::Save);
        manager.start_once().unwrap();
        manager.release(false);

        // the first save matched the loaded snapshot, the last matched the second
        assert_eq!(fx.writes(), 1);
        assert_eq!(fx.storage.summary_writes(), 1);
        assert_eq!(fx.rec.count("save_succeeded"), 1);
        assert_eq!(fx.saved_moves(1), vec!["pen_down(2,3)"]);
    }

    #[test]
    fn test_release_saves_changed_game() {
        let fx = Fixture::new();
        fx.seed_default(4);
        let (manager, _rx) = fx.open(4);
        manager.handle(Command::PenDown { x: 1, y: 1 });
        manager.start_once().unwrap();
        manager.release(true);

        assert_eq!(fx.writes(), 1);
        assert_eq!(fx.saved_moves(4), vec!["pen_down(1,1)"]);
        let comms_stop = fx.rec.entries().iter().position(|e| e == "comms_stop");
        let saved = fx.rec.entries().iter().position(|e| e == "save_succeeded");
        assert!(comms_stop.unwrap() < saved.unwrap());
        let summary = fx.storage.get_summary(4).unwrap().unwrap();
        assert_eq!(summary.n_moves, 1);
    }

    #[test]
    fn test_release_without_save_on_stop_writes_nothing() {
        let fx = Fixture::with(EngineOpts::default(), false);
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::PenDown { x: 1, y: 1 });
        manager.start_once().unwrap();
        manager.release(true);

        assert_eq!(fx.writes(), 0);
        assert_eq!(fx.rec.count("comms_stop"), 0);
        assert_eq!(fx.rec.disposals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_storage_error_keeps_old_hash() {
        let flaky = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            failures: AtomicUsize::new(0),
        });
        let fx = Fixture::with_storage(
            EngineOpts::default(),
            false,
            Arc::new(MemoryStorage::new()),
            Some(flaky.clone() as Arc<dyn Storage>),
        );
        let gi = GameConfig::new("English", DeviceRole::Standalone);
        flaky
            .save_game(1, &fx.engine.make_new_game(&gi).unwrap())
            .unwrap();

        let (manager, _rx) = fx.open(1);
        flaky.failures.store(1, Ordering::SeqCst);
        manager.handle(Command::PenDown { x: 1, y: 1 });
        manager.handle(Command::Save);
        manager.handle(Command::Zoom(0));
        manager.handle(Command::Save);
        manager.start_once().unwrap();
        manager.release(false);

        // second save isn't skipped as unchanged: the first never landed
        assert_eq!(fx.rec.count("save_succeeded"), 1);
        assert_eq!(flaky.inner.game_writes(), 2);
    }

    #[test]
    fn test_stop_drains_everything_queued_before_it() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        for i in 0..50 {
            manager.handle(Command::PenDown { x: i, y: i });
        }
        manager.release(false);

        assert_eq!(fx.rec.only(&["pen_down"]).len(), 50);
        assert_eq!(fx.rec.only(&["pen_down"]).last().unwrap(), "pen_down(49,49)");
        assert!(!manager.handle(Command::Draw));
    }

    #[test]
    fn test_release_before_start_still_runs_queue_and_disposes() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::PenDown { x: 3, y: 3 });
        manager.release(true);

        assert_eq!(fx.rec.only(&["pen_down"]), vec!["pen_down(3,3)"]);
        assert_eq!(fx.writes(), 1);
        assert_eq!(fx.rec.disposals.load(Ordering::SeqCst), 1);
        assert!(!fx.locks.is_locked(1));
    }

    #[test]
    fn test_handle_after_stop_is_dropped_not_fatal() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.release(false);
        assert!(!manager.handle(Command::PenDown { x: 0, y: 0 }));
        assert!(!manager.handle_background(Command::Save));
        assert!(fx.rec.only(&["pen_down"]).is_empty());
    }

    #[test]
    fn test_ref_count_disposes_once_at_zero() {
        let fx = Fixture::new();
        fx.seed_default(7);
        let (manager, _rx) = fx.open(7);
        let again = fx.registry.get_retained(7, false).unwrap().unwrap();
        assert!(Arc::ptr_eq(&manager, &again));
        let third = again.retain();
        assert_eq!(manager.ref_count(), 3);
        manager.start_once().unwrap();

        manager.release(false);
        third.release(false);
        assert_eq!(fx.rec.disposals.load(Ordering::SeqCst), 0);
        assert!(fx.registry.game_is_open(7));
        assert!(fx.locks.is_locked(7));

        again.release(false);
        assert_eq!(fx.rec.disposals.load(Ordering::SeqCst), 1);
        assert!(!fx.registry.game_is_open(7));
        assert!(!fx.locks.is_locked(7));
        assert!(fx.quarantine.safe_to_open(7));
    }

    #[test]
    fn test_release_above_zero_queues_save() {
        let fx = Fixture::with(EngineOpts::default(), false);
        fx.seed_default(2);
        let (manager, _rx) = fx.open(2);
        let other = fx.registry.get_retained(2, false).unwrap().unwrap();
        manager.handle(Command::PenDown { x: 4, y: 4 });
        manager.start_once().unwrap();
        other.release(true);
        wait_until(|| fx.writes() == 1);
        manager.release(false);
        assert_eq!(fx.saved_moves(2), vec!["pen_down(4,4)"]);
    }

    #[test]
    fn test_one_manager_per_rowid_across_threads() {
        let fx = Fixture::new();
        let registry = &fx.registry;
        let managers: Vec<Arc<SessionManager>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(move || registry.get_retained(11, true).unwrap().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
        assert_eq!(fx.registry.open_count(), 1);
        assert_eq!(managers[0].ref_count(), 8);

        for manager in &managers {
            manager.release(false);
        }
        assert_eq!(fx.registry.open_count(), 0);
        assert!(fx.registry.get_retained(11, false).unwrap().is_none());
    }

    #[test]
    fn test_last_release_racing_reacquire() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let registry = &fx.registry;

        for _ in 0..100 {
            let (first, _rx) = fx.open(1);
            first.start_once().unwrap();
            let original = first.clone();
            let rec = fx.rec.clone();

            thread::scope(|s| {
                s.spawn(move || first.release(true));
                s.spawn(move || {
                    let manager = registry.get_retained(1, true).unwrap().unwrap();
                    if Arc::ptr_eq(&manager, &original) {
                        // found before the other release, so still live
                        assert!(manager.ref_count() >= 1);
                        assert!(manager.is_running());
                    } else {
                        let (tx, _rx) = mpsc::unbounded_channel();
                        manager.configure(Box::new(FakeDrawer { rec }), tx).unwrap();
                        manager.start_once().unwrap();
                        manager.handle(Command::Draw);
                    }
                    manager.release(true);
                });
            });

            assert_eq!(registry.open_count(), 0);
            assert!(!fx.locks.is_locked(1));
        }
        assert!(fx.quarantine.safe_to_open(1));
        assert_eq!(fx.locks.tracked(), 0);
    }

    #[test]
    fn test_reopen_after_close_gets_fresh_manager() {
        let fx = Fixture::new();
        fx.seed_default(3);
        let (first, _rx) = fx.open(3);
        first.release(true);
        let (second, _rx) = fx.open(3);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.ref_count(), 1);
        second.release(true);
    }

    #[test]
    fn test_locked_game_cannot_be_opened() {
        let fx = Fixture::new();
        fx.seed_default(5);
        let _held = fx.locks.try_lock(5).unwrap();
        let result = fx.registry.get_retained(5, true);
        assert!(matches!(result, Err(SessionError::LockError(_))));
        assert_eq!(fx.registry.open_count(), 0);
    }

    #[test]
    fn test_configure_fails_on_missing_dictionary() {
        let fx = Fixture::new();
        fx.seed(1, &GameConfig::new("Klingon", DeviceRole::Standalone));
        let manager = fx.registry.get_retained(1, true).unwrap().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = manager.configure(Box::new(FakeDrawer { rec: fx.rec.clone() }), tx);
        match result {
            Err(SessionError::MissingDictionaries(names)) => assert_eq!(names, vec!["Klingon"]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(manager.start_once(), Err(SessionError::NotConfigured)));
        manager.release(true);
        assert_eq!(fx.writes(), 0);
        assert!(!fx.locks.is_locked(1));
    }

    #[test]
    fn test_configure_fails_without_saved_game() {
        let fx = Fixture::new();
        let manager = fx.registry.get_retained(9, true).unwrap().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = manager.configure(Box::new(FakeDrawer { rec: fx.rec.clone() }), tx);
        assert!(matches!(result, Err(SessionError::NoSavedGame(9))));
        manager.release(false);
    }

    #[test]
    fn test_engine_refusal_quarantines_game() {
        let fx = Fixture::with(
            EngineOpts {
                refuse_init: true,
                ..Default::default()
            },
            true,
        );
        fx.seed_default(6);
        let manager = fx.registry.get_retained(6, true).unwrap().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = manager.configure(Box::new(FakeDrawer { rec: fx.rec.clone() }), tx);
        assert!(matches!(result, Err(SessionError::InitFailed(6))));
        assert!(!fx.quarantine.safe_to_open(6));

        let (tx, _rx) = mpsc::unbounded_channel();
        let again = manager.configure(Box::new(FakeDrawer { rec: fx.rec.clone() }), tx);
        assert!(matches!(again, Err(SessionError::Quarantined(6))));
        manager.release(false);
    }

    #[test]
    fn test_configure_drops_stale_commands() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let manager = fx.registry.get_retained(1, true).unwrap().unwrap();
        manager.handle(Command::PenDown { x: 1, y: 1 });
        assert!(manager.busy());
        let (tx, _rx) = mpsc::unbounded_channel();
        manager
            .configure(Box::new(FakeDrawer { rec: fx.rec.clone() }), tx)
            .unwrap();
        assert!(!manager.busy());
        manager.start_once().unwrap();
        manager.release(false);
        assert!(fx.rec.only(&["pen_down"]).is_empty());
    }

    #[test]
    fn test_busy_tracks_ui_commands_only() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.handle_background(Command::Save);
        assert!(!manager.busy());
        manager.handle(Command::Draw);
        assert!(manager.busy());
        manager.start_once().unwrap();
        wait_until(|| !manager.busy());
        manager.release(false);
    }

    #[test]
    fn test_redraw_updates_toolbar_state() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, mut rx) = fx.open(1);
        assert!(!manager.get_game_state_info().can_undo);
        manager.handle(Command::PenDown { x: 1, y: 1 });
        manager.start_once().unwrap();
        wait_until(|| manager.get_game_state_info().can_undo);
        manager.release(false);
        assert!(drain(&mut rx).contains(&UiMessage::ToolbarStates));
    }

    #[test]
    fn test_receive_queues_do_and_save() {
        let fx = Fixture::with(EngineOpts::default(), false);
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.receive(b"hello".to_vec(), CommsAddr::default());
        wait_until(|| fx.writes() == 1);
        manager.release(false);

        let entries = fx.rec.only(&["receive", "server_do"]);
        assert_eq!(entries[0], "receive(hello)");
        assert_eq!(entries[1], "server_do");
        assert_eq!(fx.saved_moves(1), vec!["receive(hello)"]);
    }

    #[test]
    fn test_layout_reserves_status_strip_for_networked_game() {
        let fx = Fixture::new();
        fx.seed(1, &GameConfig::new("English", DeviceRole::Host));
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.handle(Command::Layout(LayoutRequest::Figure {
            width: 600,
            height: 900,
            font_width: 10,
            font_height: 14,
        }));
        wait_until(|| fx.rec.count("zoom(0)") == 1);
        manager.release(false);

        assert_eq!(fx.rec.count("apply_layout(560)"), 1);
        assert_eq!(fx.rec.count("dims(600)"), 1);
        assert_eq!(
            manager.conn_status_rect(),
            Some(Rect {
                left: 560,
                top: 0,
                right: 600,
                bottom: 30
            })
        );
    }

    #[test]
    fn test_layout_standalone_keeps_full_score_width() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.handle(Command::Layout(LayoutRequest::Figure {
            width: 600,
            height: 900,
            font_width: 10,
            font_height: 14,
        }));
        wait_until(|| fx.rec.count("zoom(0)") == 1);
        manager.release(false);
        assert_eq!(fx.rec.count("apply_layout(600)"), 1);
        assert_eq!(manager.conn_status_rect(), None);
    }

    #[test]
    fn test_hint_search_requeues_until_done() {
        let fx = Fixture::with(
            EngineOpts {
                hint_passes: 2,
                ..Default::default()
            },
            false,
        );
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.handle(Command::NextHint);
        wait_until(|| fx.rec.count("draw") == 1);
        manager.release(false);
        assert_eq!(
            fx.rec.only(&["hint", "draw"]),
            vec!["hint(false)", "hint(false)", "hint(false)", "draw"]
        );
    }

    #[test]
    fn test_final_asks_before_game_is_over() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, mut rx) = fx.open(1);
        manager.handle(Command::Final);
        manager.start_once().unwrap();
        wait_until(|| !manager.busy());
        manager.handle(Command::EndGame);
        manager.handle(Command::Final);
        wait_until(|| fx.rec.count("end_game") == 1 && !manager.busy());
        // PostOver is queued by Final; give it a moment to run
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut msgs = Vec::new();
        while Instant::now() < deadline {
            msgs.extend(drain(&mut rx));
            if msgs.iter().any(|m| matches!(m, UiMessage::GameOver { .. })) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        manager.release(false);

        assert!(msgs.contains(&UiMessage::QueryEndgame));
        assert!(msgs.contains(&UiMessage::GameOver {
            title: "Final scores".into(),
            text: "Player 1: 10".into()
        }));
    }

    #[test]
    fn test_dialog_commands_post_text() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, mut rx) = fx.open(1);
        manager.handle(Command::CountsValues("Counts".into()));
        manager.handle(Command::Resend {
            force: true,
            filter_msg_pending: false,
            show: true,
        });
        manager.handle(Command::Resend {
            force: true,
            filter_msg_pending: false,
            show: false,
        });
        manager.start_once().unwrap();
        manager.release(false);

        let msgs = drain(&mut rx);
        assert_eq!(
            msgs,
            vec![
                UiMessage::Dialog {
                    title: "Counts".into(),
                    text: "counts in 3 columns".into()
                },
                UiMessage::MsgsSent(0),
            ]
        );
    }

    #[test]
    fn test_start_connects_guest() {
        let fx = Fixture::with(EngineOpts::default(), false);
        fx.seed(1, &GameConfig::new("English", DeviceRole::Guest));
        let (manager, _rx) = fx.open(1);
        manager.handle(Command::Start);
        manager.start_once().unwrap();
        manager.release(false);
        assert_eq!(
            fx.rec.only(&["comms_start", "init_client", "server_do"]),
            vec!["comms_start", "init_client_connection", "server_do"]
        );
    }

    #[test]
    fn test_notify_pause_posts_message() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, mut rx) = fx.open(1);
        manager.notify_pause("paused by Robot");
        manager.release(false);
        assert_eq!(drain(&mut rx), vec![UiMessage::GotPause("paused by Robot".into())]);
    }

    #[test]
    fn test_save_dict_override_is_recorded() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.set_save_dict("French");
        manager.handle(Command::Save);
        manager.start_once().unwrap();
        manager.release(false);
        let stream = fx.storage.load_game(1).unwrap().unwrap();
        let gi = fx.engine.gi_from_stream(&stream).unwrap();
        assert_eq!(gi.dict_name, "French");
    }

    #[test]
    fn test_start_once_is_idempotent() {
        let fx = Fixture::new();
        fx.seed_default(1);
        let (manager, _rx) = fx.open(1);
        manager.start_once().unwrap();
        manager.start_once().unwrap();
        assert!(manager.is_running());
        manager.release(false);
        assert!(!manager.is_running());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "released too often")]
    fn test_extra_release_is_a_programmer_error() {
        let fx = Fixture::new();
        let manager = fx.registry.get_retained(1, true).unwrap().unwrap();
        manager.release(false);
        manager.release(false);
    }
}
