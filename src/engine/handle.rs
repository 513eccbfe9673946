//! Reference-counted ownership of one live game.
//!
//! The handle starts with one reference held by whoever opened the game.
//! The game is disposed exactly once, when the count reaches zero; after
//! that every access fails with `SessionError::HandleReleased`.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error};
use uuid::Uuid;

use crate::engine::native::NativeGame;
use crate::error_handling::programmer_error;
use crate::error_handling::types::SessionError;
use crate::session_management::quarantine::Quarantine;
use crate::storage::types::RowId;

struct HandleState {
    game: Option<Box<dyn NativeGame>>,
    ref_count: i32,
}

pub struct SessionHandle {
    id: Uuid,
    rowid: RowId,
    state: Mutex<HandleState>,
    quarantine: Arc<Quarantine>,
}

impl SessionHandle {
    pub fn new(rowid: RowId, game: Box<dyn NativeGame>, quarantine: Arc<Quarantine>) -> Self {
        let id = Uuid::new_v4();
        quarantine.record_opened(rowid);
        debug!("[{}] opened handle {}", rowid, id);
        Self {
            id,
            rowid,
            state: Mutex::new(HandleState {
                game: Some(game),
                ref_count: 1,
            }),
            quarantine,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rowid(&self) -> RowId {
        self.rowid
    }

    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        // a panic inside with_game must not make the handle unreleasable
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds a reference. Returns the new count.
    pub fn retain(&self) -> i32 {
        let mut state = self.lock_state();
        if state.ref_count <= 0 {
            programmer_error(&format!("[{}] retain() on released handle {}", self.rowid, self.id));
            return state.ref_count;
        }
        state.ref_count += 1;
        debug!("[{}] retain(): ref count now {}", self.rowid, state.ref_count);
        state.ref_count
    }

    /// Drops a reference, disposing of the game when none remain.
    ///
    /// Returns true if this call disposed of the game.
    pub fn release(&self) -> bool {
        let game = {
            let mut state = self.lock_state();
            state.ref_count -= 1;
            debug!("[{}] release(): ref count now {}", self.rowid, state.ref_count);
            if state.ref_count < 0 {
                programmer_error(&format!(
                    "[{}] handle {} released too often ({})",
                    self.rowid, self.id, state.ref_count
                ));
                return false;
            }
            if state.ref_count > 0 {
                return false;
            }
            state.game.take()
        };

        match game {
            Some(game) => {
                self.quarantine.record_closed(self.rowid);
                drop(game);
                debug!("[{}] disposed handle {}", self.rowid, self.id);
                true
            }
            None => false,
        }
    }

    pub fn is_retained(&self) -> bool {
        self.lock_state().ref_count > 0
    }

    pub fn ref_count(&self) -> i32 {
        self.lock_state().ref_count
    }

    /// Runs `f` against the game. Fails if the handle was released.
    pub fn with_game<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut dyn NativeGame) -> R,
    {
        let mut state = self.lock_state();
        match state.game.as_mut() {
            Some(game) => Ok(f(game.as_mut())),
            None => {
                programmer_error(&format!(
                    "[{}] handle {} used after release",
                    self.rowid, self.id
                ));
                Err(SessionError::HandleReleased)
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let state = self.lock_state();
        if state.game.is_some() {
            error!(
                "[{}] handle {} dropped with ref count {} and a live game",
                self.rowid, self.id, state.ref_count
            );
        }
    }
}
