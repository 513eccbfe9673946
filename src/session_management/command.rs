//! Commands a session worker executes.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::engine::types::{BoardDims, CommsAddr};

/// How the board should be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutRequest {
    /// Dimensions already figured by the caller; only applied.
    Dims(BoardDims),
    /// View size and font metrics to figure a layout from.
    Figure {
        width: i32,
        height: i32,
        font_width: i32,
        font_height: i32,
    },
}

/// One operation against a live game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Does nothing; wakes the worker.
    None,
    Draw,
    InvalAll,
    Layout(LayoutRequest),
    /// Starts comms and lets the engine take its first turn.
    Start,
    Save,
    Do,
    Receive { msg: Vec<u8>, addr: CommsAddr },
    PrefsChange,
    PenDown { x: i32, y: i32 },
    PenMove { x: i32, y: i32 },
    PenUp { x: i32, y: i32 },
    TimerFired { why: i32, when: i32, handle: i32 },
    Commit {
        phonies_confirmed: bool,
        turn_confirmed: bool,
        new_tiles: Option<Vec<i32>>,
    },
    TilesPicked { player: usize, tiles: Vec<i32> },
    Juggle,
    Flip,
    ToggleTray,
    Trade,
    CancelTrade,
    UndoCur,
    UndoLast,
    Zoom(i32),
    PrevHint,
    NextHint,
    CountsValues(String),
    Remaining(String),
    Resend {
        force: bool,
        filter_msg_pending: bool,
        show: bool,
    },
    History(String),
    Final,
    EndGame,
    PostOver { auto: bool },
    SendChat(String),
    NetStats(String),
    PassPasswd { player: usize, pwd: String },
    SetBlank {
        player: usize,
        col: i32,
        row: i32,
        tile: i32,
    },
    SetMqttId { addr_type: u32, dev_id: String },
    Pause(String),
    Unpause(String),
    /// Terminal. Queued only by the session manager when it shuts down.
    Stop { save: bool },
}

/// The tag of a `Command`, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    None,
    Draw,
    InvalAll,
    Layout,
    Start,
    Save,
    Do,
    Receive,
    PrefsChange,
    PenDown,
    PenMove,
    PenUp,
    TimerFired,
    Commit,
    TilesPicked,
    Juggle,
    Flip,
    ToggleTray,
    Trade,
    CancelTrade,
    UndoCur,
    UndoLast,
    Zoom,
    PrevHint,
    NextHint,
    CountsValues,
    Remaining,
    Resend,
    History,
    Final,
    EndGame,
    PostOver,
    SendChat,
    NetStats,
    PassPasswd,
    SetBlank,
    SetMqttId,
    Pause,
    Unpause,
    Stop,
}

impl CommandKind {
    /// Kinds where only the last of a run of queued duplicates matters.
    pub fn is_coalescable(self) -> bool {
        matches!(
            self,
            CommandKind::Save
                | CommandKind::Draw
                | CommandKind::Do
                | CommandKind::PenMove
                | CommandKind::PrevHint
                | CommandKind::NextHint
        )
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::None => CommandKind::None,
            Command::Draw => CommandKind::Draw,
            Command::InvalAll => CommandKind::InvalAll,
            Command::Layout(_) => CommandKind::Layout,
            Command::Start => CommandKind::Start,
            Command::Save => CommandKind::Save,
            Command::Do => CommandKind::Do,
            Command::Receive { .. } => CommandKind::Receive,
            Command::PrefsChange => CommandKind::PrefsChange,
            Command::PenDown { .. } => CommandKind::PenDown,
            Command::PenMove { .. } => CommandKind::PenMove,
            Command::PenUp { .. } => CommandKind::PenUp,
            Command::TimerFired { .. } => CommandKind::TimerFired,
            Command::Commit { .. } => CommandKind::Commit,
            Command::TilesPicked { .. } => CommandKind::TilesPicked,
            Command::Juggle => CommandKind::Juggle,
            Command::Flip => CommandKind::Flip,
            Command::ToggleTray => CommandKind::ToggleTray,
            Command::Trade => CommandKind::Trade,
            Command::CancelTrade => CommandKind::CancelTrade,
            Command::UndoCur => CommandKind::UndoCur,
            Command::UndoLast => CommandKind::UndoLast,
            Command::Zoom(_) => CommandKind::Zoom,
            Command::PrevHint => CommandKind::PrevHint,
            Command::NextHint => CommandKind::NextHint,
            Command::CountsValues(_) => CommandKind::CountsValues,
            Command::Remaining(_) => CommandKind::Remaining,
            Command::Resend { .. } => CommandKind::Resend,
            Command::History(_) => CommandKind::History,
            Command::Final => CommandKind::Final,
            Command::EndGame => CommandKind::EndGame,
            Command::PostOver { .. } => CommandKind::PostOver,
            Command::SendChat(_) => CommandKind::SendChat,
            Command::NetStats(_) => CommandKind::NetStats,
            Command::PassPasswd { .. } => CommandKind::PassPasswd,
            Command::SetBlank { .. } => CommandKind::SetBlank,
            Command::SetMqttId { .. } => CommandKind::SetMqttId,
            Command::Pause(_) => CommandKind::Pause,
            Command::Unpause(_) => CommandKind::Unpause,
            Command::Stop { .. } => CommandKind::Stop,
        }
    }

    pub fn is_coalescable(&self) -> bool {
        self.kind().is_coalescable()
    }

    pub fn commit() -> Self {
        Command::Commit {
            phonies_confirmed: false,
            turn_confirmed: false,
            new_tiles: None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn command_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<name>[a-z_]+)(?::(?P<args>.*))?$").ok())
        .as_ref()
}

fn arg<T: FromStr>(args: &[&str], idx: usize, line: &str) -> Result<T, String> {
    args.get(idx)
        .ok_or_else(|| format!("'{}': missing argument {}", line, idx + 1))?
        .trim()
        .parse()
        .map_err(|_| format!("'{}': bad argument {}", line, idx + 1))
}

fn opt_arg<T: FromStr>(args: &[&str], idx: usize, default: T, line: &str) -> Result<T, String> {
    match args.get(idx) {
        Some(_) => arg(args, idx, line),
        None => Ok(default),
    }
}

/// Parses the textual form used on the command line, e.g. `pen_down:5,5`,
/// `commit`, `chat:hello there`, `layout:600,800,10,14`.
impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let caps = command_regex()
            .and_then(|re| re.captures(line))
            .ok_or_else(|| format!("'{}': not a command", line))?;
        let name = &caps["name"];
        let raw = caps.name("args").map(|m| m.as_str()).unwrap_or("");
        let args: Vec<&str> = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split(',').collect()
        };

        let cmd = match name {
            "none" => Command::None,
            "draw" => Command::Draw,
            "inval_all" => Command::InvalAll,
            "layout" => Command::Layout(LayoutRequest::Figure {
                width: arg(&args, 0, line)?,
                height: arg(&args, 1, line)?,
                font_width: opt_arg(&args, 2, 0, line)?,
                font_height: opt_arg(&args, 3, 0, line)?,
            }),
            "start" => Command::Start,
            "save" => Command::Save,
            "do" => Command::Do,
            "receive" => Command::Receive {
                msg: raw.as_bytes().to_vec(),
                addr: CommsAddr::default(),
            },
            "prefs" => Command::PrefsChange,
            "pen_down" => Command::PenDown {
                x: arg(&args, 0, line)?,
                y: arg(&args, 1, line)?,
            },
            "pen_move" => Command::PenMove {
                x: arg(&args, 0, line)?,
                y: arg(&args, 1, line)?,
            },
            "pen_up" => Command::PenUp {
                x: arg(&args, 0, line)?,
                y: arg(&args, 1, line)?,
            },
            "timer" => Command::TimerFired {
                why: arg(&args, 0, line)?,
                when: arg(&args, 1, line)?,
                handle: arg(&args, 2, line)?,
            },
            "commit" => Command::Commit {
                phonies_confirmed: opt_arg(&args, 0, false, line)?,
                turn_confirmed: opt_arg(&args, 1, false, line)?,
                new_tiles: None,
            },
            "tiles_picked" => Command::TilesPicked {
                player: arg(&args, 0, line)?,
                tiles: args
                    .iter()
                    .skip(1)
                    .map(|t| t.trim().parse().map_err(|_| format!("'{}': bad tile", line)))
                    .collect::<Result<Vec<i32>, String>>()?,
            },
            "juggle" => Command::Juggle,
            "flip" => Command::Flip,
            "toggle_tray" => Command::ToggleTray,
            "trade" => Command::Trade,
            "cancel_trade" => Command::CancelTrade,
            "undo_cur" => Command::UndoCur,
            "undo_last" => Command::UndoLast,
            "zoom" => Command::Zoom(arg(&args, 0, line)?),
            "prev_hint" => Command::PrevHint,
            "next_hint" => Command::NextHint,
            "counts" => Command::CountsValues(raw.to_string()),
            "remaining" => Command::Remaining(raw.to_string()),
            "resend" => Command::Resend {
                force: opt_arg(&args, 0, false, line)?,
                filter_msg_pending: opt_arg(&args, 1, false, line)?,
                show: opt_arg(&args, 2, true, line)?,
            },
            "history" => Command::History(raw.to_string()),
            "final" => Command::Final,
            "end_game" => Command::EndGame,
            "post_over" => Command::PostOver {
                auto: opt_arg(&args, 0, false, line)?,
            },
            "chat" => Command::SendChat(raw.to_string()),
            "net_stats" => Command::NetStats(raw.to_string()),
            "passwd" => Command::PassPasswd {
                player: arg(&args, 0, line)?,
                pwd: args.get(1).map(|s| s.to_string()).unwrap_or_default(),
            },
            "blank" => Command::SetBlank {
                player: arg(&args, 0, line)?,
                col: arg(&args, 1, line)?,
                row: arg(&args, 2, line)?,
                tile: arg(&args, 3, line)?,
            },
            "mqtt_id" => Command::SetMqttId {
                addr_type: arg(&args, 0, line)?,
                dev_id: args.get(1).map(|s| s.trim().to_string()).unwrap_or_default(),
            },
            "pause" => Command::Pause(raw.to_string()),
            "unpause" => Command::Unpause(raw.to_string()),
            // stop belongs to the session manager
            other => return Err(format!("'{}': unknown command '{}'", line, other)),
        };
        Ok(cmd)
    }
}
