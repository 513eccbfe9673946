use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent key identifying one stored game.
pub type RowId = i64;

/// What the games list shows for a stored game without opening it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub rowid: RowId,
    pub name: String,
    pub dict_name: String,
    pub player_names: Vec<String>,
    pub scores: Vec<i32>,
    pub turn: Option<usize>,
    pub n_moves: u32,
    pub game_over: bool,
    pub n_pending_messages: u32,
    pub last_saved: DateTime<Utc>,
}
