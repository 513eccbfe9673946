//! The command queue between callers and a session worker.
//!
//! UI and background commands share one FIFO channel. The UI flag only feeds
//! a counter so `busy()` can answer without walking the queue. The receiving
//! side keeps a one-element lookahead so the worker can ask whether the
//! immediately next command has the same kind as the current one.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error_handling::programmer_error;
use crate::session_management::command::{Command, CommandKind};
use crate::storage::types::RowId;

#[derive(Debug)]
pub(crate) struct Envelope {
    pub cmd: Command,
    pub is_ui: bool,
}

/// Sending side. Cheap to clone; the worker holds a clone to queue
/// follow-on commands.
#[derive(Clone)]
pub struct CommandQueue {
    rowid: RowId,
    tx: UnboundedSender<Envelope>,
    ui_pending: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

pub(crate) struct QueueReceiver {
    rx: UnboundedReceiver<Envelope>,
    lookahead: Option<Envelope>,
    ui_pending: Arc<AtomicUsize>,
}

impl CommandQueue {
    pub(crate) fn new(rowid: RowId) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ui_pending = Arc::new(AtomicUsize::new(0));
        let queue = Self {
            rowid,
            tx,
            ui_pending: ui_pending.clone(),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        let receiver = QueueReceiver {
            rx,
            lookahead: None,
            ui_pending,
        };
        (queue, receiver)
    }

    /// Queues a UI-originated command. Returns false if it was dropped.
    pub fn handle(&self, cmd: Command) -> bool {
        self.push(cmd, true)
    }

    /// Queues a command that doesn't count toward `busy()`.
    pub fn handle_background(&self, cmd: Command) -> bool {
        self.push(cmd, false)
    }

    fn push(&self, cmd: Command, is_ui: bool) -> bool {
        let kind = cmd.kind();
        if kind == CommandKind::Stop {
            programmer_error(&format!("[{}] Stop queued directly; release the session instead", self.rowid));
            return false;
        }
        if self.is_stopped() && kind != CommandKind::None {
            warn!("[{}] handle({}): not adding to stopped session", self.rowid, kind);
            return false;
        }
        self.send(Envelope { cmd, is_ui })
    }

    fn send(&self, envelope: Envelope) -> bool {
        let is_ui = envelope.is_ui;
        if is_ui {
            self.ui_pending.fetch_add(1, Ordering::SeqCst);
        }
        match self.tx.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                if is_ui {
                    self.ui_pending.fetch_sub(1, Ordering::SeqCst);
                }
                warn!("[{}] worker gone, dropping {}", self.rowid, e.0.cmd.kind());
                false
            }
        }
    }

    /// Refuses further commands and queues the terminal `Stop` behind
    /// everything already queued.
    pub(crate) fn stop(&self, save: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            programmer_error(&format!("[{}] session stopped twice", self.rowid));
            return;
        }
        info!("[{}] stopping (save: {})", self.rowid, save);
        self.send(Envelope {
            cmd: Command::Stop { save },
            is_ui: false,
        });
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether any UI-originated command is still waiting to run.
    pub fn busy(&self) -> bool {
        self.ui_pending.load(Ordering::SeqCst) > 0
    }
}

impl QueueReceiver {
    fn take(&mut self, envelope: Envelope) -> Envelope {
        if envelope.is_ui {
            self.ui_pending.fetch_sub(1, Ordering::SeqCst);
        }
        envelope
    }

    /// Blocks until a command arrives. `None` once every sender is gone.
    ///
    /// Must not be called from inside an async runtime.
    pub fn next_blocking(&mut self) -> Option<Envelope> {
        let envelope = match self.lookahead.take() {
            Some(envelope) => envelope,
            None => self.rx.blocking_recv()?,
        };
        Some(self.take(envelope))
    }

    /// Next command if one is already queued.
    pub fn next_now(&mut self) -> Option<Envelope> {
        let envelope = match self.lookahead.take() {
            Some(envelope) => envelope,
            None => self.rx.try_recv().ok()?,
        };
        Some(self.take(envelope))
    }

    /// Kind of the immediately next queued command, without removing it.
    pub fn peek_kind(&mut self) -> Option<CommandKind> {
        if self.lookahead.is_none() {
            match self.rx.try_recv() {
                Ok(envelope) => self.lookahead = Some(envelope),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
        self.lookahead.as_ref().map(|envelope| envelope.cmd.kind())
    }

    /// True if the immediately next queued command has kind `kind`.
    pub fn next_same(&mut self, kind: CommandKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// Drops everything queued. Returns the kinds dropped, in order.
    pub fn clear(&mut self, rowid: RowId) -> Vec<CommandKind> {
        let mut dropped = Vec::new();
        while let Some(envelope) = self.next_now() {
            debug!("[{}] removing {} from queue", rowid, envelope.cmd.kind());
            dropped.push(envelope.cmd.kind());
        }
        dropped
    }
}
