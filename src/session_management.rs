//! Session management core module.
//!
//! A session is one open game: its engine handle, the worker thread that
//! runs every operation against it, and the queue feeding that worker.
//!
//! - `command`: the closed set of operations a session runs
//! - `queue`: FIFO command queue with busy tracking and one-element lookahead
//! - `worker`: the dispatch loop, saving and layout
//! - `session_manager`: configure, start, queue, release
//! - `registry`: at most one session per game, reference counted
//! - `game_lock`: per-game exclusive and read-only locks
//! - `quarantine`: refusing games that keep failing to open
//! - `callbacks`: drawing and UI messages going back to the caller

pub mod callbacks;
pub mod command;
pub mod game_lock;
pub mod quarantine;
pub mod queue;
pub mod registry;
pub mod session_manager;
pub mod worker;

#[cfg(test)]
mod tests;

pub use callbacks::{NullDrawer, SyncedDraw, UiMessage, UiReceiver, UiSender};
pub use command::{Command, CommandKind, LayoutRequest};
pub use game_lock::{GameLock, GameLockTable};
pub use quarantine::Quarantine;
pub use registry::SessionRegistry;
pub use session_manager::{SessionContext, SessionManager};
