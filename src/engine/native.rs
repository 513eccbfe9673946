//! The game engine boundary.
//!
//! Everything behind these traits (board model, move validation, scoring,
//! dictionary lookup, robot players, transports) belongs to the engine. The
//! session layer only sequences calls and looks at the return values: a
//! `bool` from a board operation means "something visible changed, redraw".
//! Invalid input is reported by returning `false`/`None`, never by panicking.

use crate::configuration::types::{CommonPrefs, GameConfig};
use crate::engine::dictionary::DictPairs;
use crate::engine::types::{
    BoardDims, CommsAddr, GameStateInfo, HintOutcome, LayoutParams, TrayVisState,
};
use crate::storage::types::{GameSummary, RowId};

/// Factory side of the engine: decodes saved streams into live games.
pub trait Engine: Send + Sync {
    /// Reads the game configuration stored at the front of a saved stream.
    fn gi_from_stream(&self, stream: &[u8]) -> Option<GameConfig>;

    /// Rebuilds a live game from a saved stream.
    ///
    /// Returns `None` when the stream or the dictionaries can't be used.
    fn init_from_stream(
        &self,
        rowid: RowId,
        stream: &[u8],
        gi: &GameConfig,
        dicts: &DictPairs,
        prefs: &CommonPrefs,
    ) -> Option<Box<dyn NativeGame>>;

    /// Produces the saved stream of a brand new game.
    fn make_new_game(&self, gi: &GameConfig) -> Option<Vec<u8>>;
}

/// One live game. Only ever touched from its session's worker thread.
pub trait NativeGame: Send {
    // --- persistence
    /// Serializes the full game. `None` means serialization failed.
    fn save_to_stream(&mut self, gi: &GameConfig) -> Option<Vec<u8>>;
    /// Tells the engine the last stream it produced is now on disk.
    fn save_succeeded(&mut self) {}
    fn get_gi(&self) -> GameConfig;
    fn summarize(&self, rowid: RowId, gi: &GameConfig) -> GameSummary;
    fn get_state(&self) -> GameStateInfo;

    // --- server / turn logic
    /// Lets the engine do pending turn work (robot moves, queued
    /// bookkeeping). Returns whether anything visible changed.
    fn server_do(&mut self) -> bool;
    fn game_is_over(&self) -> bool {
        false
    }
    fn end_game(&mut self) {}
    fn handle_undo(&mut self) {}
    fn tiles_picked(&mut self, _player: usize, _tiles: &[i32]) {}
    fn write_final_scores(&self) -> String {
        String::new()
    }
    fn write_game_history(&self, _game_over: bool) -> String {
        String::new()
    }
    fn format_dict_counts(&self, _n_cols: u32) -> String {
        String::new()
    }
    fn prefs_changed(&mut self, _prefs: &CommonPrefs) -> bool {
        false
    }

    // --- comms
    fn receive_message(&mut self, msg: &[u8], from: &CommsAddr) -> bool;
    fn comms_start(&mut self) {}
    fn comms_stop(&mut self) {}
    fn init_client_connection(&mut self) {}
    /// Resends everything unacknowledged. Returns the number of messages sent.
    fn resend_all(&mut self, _force: bool, _filter_msg_pending: bool) -> u32 {
        0
    }
    fn comms_stats(&self) -> String {
        String::new()
    }
    fn add_mqtt_dev_id(&mut self, _addr_type: u32, _dev_id: &str) {}

    // --- board
    fn pen_down(&mut self, x: i32, y: i32) -> bool;
    fn pen_move(&mut self, x: i32, y: i32) -> bool;
    fn pen_up(&mut self, x: i32, y: i32) -> bool;
    fn commit_turn(
        &mut self,
        phonies_confirmed: bool,
        turn_confirmed: bool,
        new_tiles: Option<&[i32]>,
    ) -> bool;
    fn inval_all(&mut self) {}
    fn figure_layout(&mut self, _gi: &GameConfig, params: &LayoutParams) -> BoardDims {
        BoardDims {
            left: params.left,
            top: params.top,
            width: params.width,
            height: params.height,
            board_width: params.width,
            ..Default::default()
        }
    }
    fn apply_layout(&mut self, _dims: &BoardDims) {}
    fn juggle_tray(&mut self) -> bool {
        false
    }
    fn flip(&mut self) -> bool {
        false
    }
    fn tray_vis_state(&self) -> TrayVisState {
        TrayVisState::Revealed
    }
    fn show_tray(&mut self) -> bool {
        false
    }
    fn hide_tray(&mut self) -> bool {
        false
    }
    fn begin_trade(&mut self) -> bool {
        false
    }
    fn end_trade(&mut self) -> bool {
        false
    }
    fn replace_tiles(&mut self) -> bool {
        false
    }
    fn redo_replaced_tiles(&mut self) -> bool {
        false
    }
    fn request_hint(&mut self, _use_limits: bool, _go_backwards: bool) -> HintOutcome {
        HintOutcome::default()
    }
    /// Zooms by `by` steps; zero only refreshes the zoom limits.
    fn zoom(&mut self, _by: i32) -> bool {
        false
    }
    fn format_remaining_tiles(&self) -> String {
        String::new()
    }
    fn send_chat(&mut self, _text: &str) {}
    fn password_provided(&mut self, _player: usize, _password: &str) -> bool {
        false
    }
    fn set_blank_value(&mut self, _player: usize, _col: i32, _row: i32, _tile: i32) -> bool {
        false
    }
    fn timer_fired(&mut self, _why: i32, _when: i32, _handle: i32) -> bool {
        false
    }
    fn pause(&mut self, _msg: &str) {}
    fn unpause(&mut self, _msg: &str) {}
}
