//! A small deterministic engine that runs in-process.
//!
//! It is not a word game. It keeps just enough state (cursor, placed cells,
//! turns, scores, chats, pause, tray) for every session command to have an
//! observable effect, and serializes that state as JSON so saves round-trip
//! and identical states hash identically.

use chrono::Utc;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::configuration::types::{CommonPrefs, GameConfig};
use crate::engine::dictionary::{DictPairs, DictStore};
use crate::engine::native::{Engine, NativeGame};
use crate::engine::types::{
    BoardDims, CommsAddr, GameStateInfo, HintOutcome, LayoutParams, TrayVisState,
};
use crate::storage::types::{GameSummary, RowId};

/// Moves after which the game is over.
pub const MAX_MOVES: u32 = 40;
const MAX_ZOOM: i32 = 3;
/// Hint searches take this many calls when limits are in force.
const HINT_STEPS: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SimState {
    cursor: Option<(i32, i32)>,
    pen_is_down: bool,
    placed: Vec<(i32, i32)>,
    scores: Vec<i32>,
    turn: usize,
    n_moves: u32,
    game_over: bool,
    chats: Vec<String>,
    paused: Option<String>,
    tray_vis: TrayVisState,
    in_trade: bool,
    zoom: i32,
    hint_index: i32,
    #[serde(skip)]
    hint_progress: u32,
    received: u32,
    outbox: u32,
    passwords_ok: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimStream {
    gi: GameConfig,
    state: SimState,
}

#[derive(Debug, Default)]
pub struct SimEngine;

impl SimEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for SimEngine {
    fn gi_from_stream(&self, stream: &[u8]) -> Option<GameConfig> {
        match serde_json::from_slice::<SimStream>(stream) {
            Ok(parsed) => Some(parsed.gi),
            Err(e) => {
                warn!("Unreadable game stream: {}", e);
                None
            }
        }
    }

    fn init_from_stream(
        &self,
        rowid: RowId,
        stream: &[u8],
        gi: &GameConfig,
        dicts: &DictPairs,
        prefs: &CommonPrefs,
    ) -> Option<Box<dyn NativeGame>> {
        if DictStore::any_missing(&gi.dict_names(), dicts) {
            warn!("[{}] refusing to open without dictionaries", rowid);
            return None;
        }
        let parsed: SimStream = serde_json::from_slice(stream).ok()?;
        debug!("[{}] sim game opened after {} moves", rowid, parsed.state.n_moves);
        Some(Box::new(SimGame {
            gi: gi.clone(),
            state: parsed.state,
            prefs: prefs.clone(),
            comms_running: false,
        }))
    }

    fn make_new_game(&self, gi: &GameConfig) -> Option<Vec<u8>> {
        let stream = SimStream {
            gi: gi.clone(),
            state: SimState {
                scores: vec![0; gi.players.len()],
                tray_vis: TrayVisState::Revealed,
                ..Default::default()
            },
        };
        serde_json::to_vec(&stream).ok()
    }
}

pub struct SimGame {
    gi: GameConfig,
    state: SimState,
    prefs: CommonPrefs,
    comms_running: bool,
}

impl SimGame {
    fn n_players(&self) -> usize {
        self.gi.players.len().max(1)
    }

    fn current_is_robot(&self) -> bool {
        self.gi
            .players
            .get(self.state.turn)
            .map(|p| p.is_local && p.is_robot)
            .unwrap_or(false)
    }

    fn advance_turn(&mut self, points: i32) {
        if let Some(score) = self.state.scores.get_mut(self.state.turn) {
            *score += points;
        }
        self.state.n_moves += 1;
        self.state.turn = (self.state.turn + 1) % self.n_players();
        if self.gi.is_networked() {
            self.state.outbox += 1;
        }
        if self.state.n_moves >= MAX_MOVES {
            self.state.game_over = true;
        }
    }
}

impl NativeGame for SimGame {
    fn save_to_stream(&mut self, gi: &GameConfig) -> Option<Vec<u8>> {
        let stream = SimStream {
            gi: gi.clone(),
            state: self.state.clone(),
        };
        serde_json::to_vec(&stream).ok()
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
            scores: self.state.scores.clone(),
            turn: if self.state.game_over {
                None
            } else {
                Some(self.state.turn)
            },
            n_moves: self.state.n_moves,
            game_over: self.state.game_over,
            n_pending_messages: self.state.outbox,
            last_saved: Utc::now(),
        }
    }

    fn get_state(&self) -> GameStateInfo {
        let my_turn = !self.state.game_over && !self.current_is_robot();
        GameStateInfo {
            vis_tile_count: self.gi.tray_size as u32,
            tray_vis_state: self.state.tray_vis,
            n_pending_messages: self.state.outbox,
            can_hint: my_turn && !self.gi.hints_not_allowed,
            can_undo: !self.state.placed.is_empty(),
            can_redo: false,
            in_trade: self.state.in_trade,
            trade_tiles_selected: self.state.in_trade && !self.state.placed.is_empty(),
            can_chat: self.gi.is_networked(),
            can_shuffle: my_turn,
            cur_turn_selected: my_turn,
            can_hide_rack: self.state.tray_vis == TrayVisState::Revealed,
            can_trade: my_turn && !self.state.in_trade,
            can_pause: self.gi.timer_enabled && self.state.paused.is_none(),
            can_unpause: self.state.paused.is_some(),
            can_rematch: self.state.game_over,
        }
    }

    fn server_do(&mut self) -> bool {
        let mut changed = false;
        while !self.state.game_over && self.current_is_robot() {
            let points = self.prefs.robot_smartness as i32;
            trace!("robot {} plays for {}", self.state.turn, points);
            self.advance_turn(points);
            changed = true;
        }
        changed
    }

    fn game_is_over(&self) -> bool {
        self.state.game_over
    }

    fn end_game(&mut self) {
        self.state.game_over = true;
    }

    fn handle_undo(&mut self) {
        self.state.placed.pop();
    }

    fn tiles_picked(&mut self, _player: usize, tiles: &[i32]) {
        trace!("picked {} tiles", tiles.len());
    }

    fn write_final_scores(&self) -> String {
        self.gi
            .players
            .iter()
            .zip(self.state.scores.iter())
            .map(|(p, s)| format!("{}: {}", p.name, s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn write_game_history(&self, game_over: bool) -> String {
        let mut history = format!("{} moves played", self.state.n_moves);
        if game_over {
            history.push('\n');
            history.push_str(&self.write_final_scores());
        }
        history
    }

    fn format_dict_counts(&self, _n_cols: u32) -> String {
        format!("Dictionary: {}", self.gi.dict_name)
    }

    fn prefs_changed(&mut self, prefs: &CommonPrefs) -> bool {
        let changed = *prefs != self.prefs;
        self.prefs = prefs.clone();
        changed
    }

    fn receive_message(&mut self, msg: &[u8], _from: &CommsAddr) -> bool {
        self.state.received += 1;
        match std::str::from_utf8(msg) {
            Ok(text) => match text.strip_prefix("chat:") {
                Some(chat) => {
                    self.state.chats.push(chat.to_string());
                    true
                }
                None if text == "move" => {
                    self.advance_turn(1);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn comms_start(&mut self) {
        self.comms_running = true;
    }

    fn comms_stop(&mut self) {
        self.comms_running = false;
    }

    fn resend_all(&mut self, force: bool, _filter_msg_pending: bool) -> u32 {
        if !self.comms_running && !force {
            return 0;
        }
        self.state.outbox
    }

    fn comms_stats(&self) -> String {
        format!(
            "received: {}\nunacknowledged: {}",
            self.state.received, self.state.outbox
        )
    }

    fn pen_down(&mut self, x: i32, y: i32) -> bool {
        self.state.pen_is_down = true;
        self.state.cursor = Some((x, y));
        true
    }

    fn pen_move(&mut self, x: i32, y: i32) -> bool {
        if !self.state.pen_is_down || self.state.cursor == Some((x, y)) {
            return false;
        }
        self.state.cursor = Some((x, y));
        true
    }

    fn pen_up(&mut self, x: i32, y: i32) -> bool {
        if !self.state.pen_is_down {
            return false;
        }
        self.state.pen_is_down = false;
        self.state.cursor = Some((x, y));
        self.state.placed.push((x, y));
        true
    }

    fn commit_turn(
        &mut self,
        _phonies_confirmed: bool,
        _turn_confirmed: bool,
        new_tiles: Option<&[i32]>,
    ) -> bool {
        if self.state.game_over {
            return false;
        }
        if self.state.in_trade {
            // trading scores nothing
            self.state.in_trade = false;
            self.state.placed.clear();
            self.advance_turn(0);
            return true;
        }
        if self.state.placed.is_empty() && new_tiles.is_none() {
            return false;
        }
        let points = self.state.placed.len() as i32;
        self.state.placed.clear();
        self.advance_turn(points);
        true
    }

    fn figure_layout(&mut self, _gi: &GameConfig, params: &LayoutParams) -> BoardDims {
        let board_width = params.width;
        let cell_size = (board_width / self.gi.board_size.max(1) as i32).max(1);
        let score_ht = params.height * params.score_pct / 1000;
        let tray_ht = params.height * params.tray_pct / 1000;
        BoardDims {
            left: params.left,
            top: params.top,
            width: params.width,
            height: params.height,
            score_left: params.left,
            score_width: params.score_width,
            score_ht,
            board_width,
            board_ht: params.height - score_ht - tray_ht,
            tray_left: params.left,
            tray_top: params.top + params.height - tray_ht,
            tray_width: params.width,
            tray_ht,
            cell_size,
            timer_width: if self.gi.timer_enabled { params.font_width * 5 } else { 0 },
        }
    }

    fn juggle_tray(&mut self) -> bool {
        self.state.tray_vis == TrayVisState::Revealed
    }

    fn tray_vis_state(&self) -> TrayVisState {
        self.state.tray_vis
    }

    fn show_tray(&mut self) -> bool {
        let changed = self.state.tray_vis != TrayVisState::Revealed;
        self.state.tray_vis = TrayVisState::Revealed;
        changed
    }

    fn hide_tray(&mut self) -> bool {
        let changed = self.state.tray_vis != TrayVisState::Reversed;
        self.state.tray_vis = TrayVisState::Reversed;
        changed
    }

    fn flip(&mut self) -> bool {
        true
    }

    fn begin_trade(&mut self) -> bool {
        let changed = !self.state.in_trade;
        self.state.in_trade = true;
        changed
    }

    fn end_trade(&mut self) -> bool {
        let changed = self.state.in_trade;
        self.state.in_trade = false;
        changed
    }

    fn replace_tiles(&mut self) -> bool {
        self.state.placed.pop().is_some()
    }

    fn redo_replaced_tiles(&mut self) -> bool {
        false
    }

    fn request_hint(&mut self, use_limits: bool, go_backwards: bool) -> HintOutcome {
        if self.gi.hints_not_allowed {
            return HintOutcome::default();
        }
        if use_limits && self.state.hint_progress + 1 < HINT_STEPS {
            self.state.hint_progress += 1;
            return HintOutcome {
                redraw: false,
                work_remains: true,
            };
        }
        self.state.hint_progress = 0;
        self.state.hint_index += if go_backwards { -1 } else { 1 };
        HintOutcome {
            redraw: true,
            work_remains: false,
        }
    }

    fn zoom(&mut self, by: i32) -> bool {
        let zoom = (self.state.zoom + by).clamp(0, MAX_ZOOM);
        let changed = zoom != self.state.zoom;
        self.state.zoom = zoom;
        changed
    }

    fn format_remaining_tiles(&self) -> String {
        format!("{} tiles left", MAX_MOVES.saturating_sub(self.state.n_moves))
    }

    fn send_chat(&mut self, text: &str) {
        self.state.chats.push(text.to_string());
        if self.gi.is_networked() {
            self.state.outbox += 1;
        }
    }

    fn password_provided(&mut self, player: usize, password: &str) -> bool {
        if player >= self.gi.players.len() || password.is_empty() {
            return false;
        }
        if !self.state.passwords_ok.contains(&player) {
            self.state.passwords_ok.push(player);
        }
        true
    }

    fn set_blank_value(&mut self, player: usize, col: i32, row: i32, _tile: i32) -> bool {
        player == self.state.turn && self.state.placed.contains(&(col, row))
    }

    fn timer_fired(&mut self, _why: i32, _when: i32, _handle: i32) -> bool {
        self.gi.timer_enabled
    }

    fn pause(&mut self, msg: &str) {
        self.state.paused = Some(msg.to_string());
    }

    fn unpause(&mut self, _msg: &str) {
        self.state.paused = None;
    }
}
