//! What a session sends back to its UI.

use log::trace;
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::engine::native::NativeGame;
use crate::engine::types::BoardDims;
use crate::storage::types::RowId;

/// Messages posted from the worker to the UI context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UiMessage {
    Dialog { title: String, text: String },
    /// The game isn't over; ask whether to end it.
    QueryEndgame,
    /// Toolbar state changed; fetch it with `get_game_state_info`.
    ToolbarStates,
    GotPause(String),
    GameOver { title: String, text: String },
    MsgsSent(u32),
}

pub type UiSender = UnboundedSender<UiMessage>;
pub type UiReceiver = UnboundedReceiver<UiMessage>;

/// Drawing surface a session redraws into.
///
/// Called on the session worker, so implementors synchronize with whatever
/// else reads their surface.
pub trait SyncedDraw: Send {
    /// Redraws the board. The game is only reachable for the call.
    fn do_jni_draw(&mut self, game: &mut dyn NativeGame);

    fn dims_changed(&mut self, dims: &BoardDims);
}

/// Draws nothing. For sessions with no view attached.
pub struct NullDrawer;

impl SyncedDraw for NullDrawer {
    fn do_jni_draw(&mut self, _game: &mut dyn NativeGame) {}

    fn dims_changed(&mut self, _dims: &BoardDims) {}
}

/// Posts `msg`, dropping it if the UI has gone away.
pub(crate) fn post(ui: &UiSender, rowid: RowId, msg: UiMessage) {
    trace!("[{}] posting {:?}", rowid, msg);
    if ui.send(msg).is_err() {
        trace!("[{}] no UI listening", rowid);
    }
}
