//! At most one live session per game.
//!
//! The registry is created once by the application and passed to whoever
//! needs sessions. Lookups, inserts, removals and reference-count changes
//! all happen under one lock, so a release that takes a session to zero
//! removes it before any other thread can find it again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error_handling::types::{LockError, SessionError};
use crate::session_management::game_lock::GameLockTable;
use crate::session_management::session_manager::{SessionContext, SessionManager, SessionMap};
use crate::storage::types::RowId;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    locks: Arc<GameLockTable>,
    ctx: SessionContext,
    lock_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext, locks: Arc<GameLockTable>, lock_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            locks,
            ctx,
            lock_timeout,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<RowId, Arc<SessionManager>>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn locks(&self) -> &Arc<GameLockTable> {
        &self.locks
    }

    /// Returns the live session for `rowid` with a reference added for the
    /// caller, creating it when asked to and none exists.
    ///
    /// Creating a session takes the game's exclusive lock first. A game
    /// somebody else holds (a session still shutting down, say) is retried
    /// until the configured lock timeout runs out. The registry lock is never
    /// held while sleeping.
    pub fn get_retained(
        &self,
        rowid: RowId,
        create_if_missing: bool,
    ) -> Result<Option<Arc<SessionManager>>, SessionError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            {
                let mut sessions = self.sessions();
                if let Some(manager) = sessions.get(&rowid) {
                    manager.retain_locked();
                    return Ok(Some(manager.clone()));
                }
                if !create_if_missing {
                    return Ok(None);
                }
                match self.locks.try_lock(rowid) {
                    Ok(lock) => {
                        let manager = Arc::new(SessionManager::new(
                            lock,
                            self.ctx.clone(),
                            Arc::downgrade(&self.sessions),
                        ));
                        manager.retain_locked();
                        sessions.insert(rowid, manager.clone());
                        debug!("[{}] session created; {} open", rowid, sessions.len());
                        return Ok(Some(manager));
                    }
                    Err(LockError::Unavailable(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "[{}] gave up waiting for lock; holder: {:?}",
                    rowid,
                    self.locks.holder(rowid)
                );
                return Err(LockError::TimedOut(rowid).into());
            }
            thread::sleep(LOCK_RETRY_INTERVAL);
        }
    }

    /// Whether a live session exists for `rowid`. Takes no reference.
    pub fn game_is_open(&self, rowid: RowId) -> bool {
        let open = self.sessions().contains_key(&rowid);
        debug!("game_is_open({}) => {}", rowid, open);
        open
    }

    pub fn open_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn open_rowids(&self) -> Vec<RowId> {
        let mut rowids: Vec<RowId> = self.sessions().keys().copied().collect();
        rowids.sort();
        rowids
    }
}
