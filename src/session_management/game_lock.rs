//! Per-game locks.
//!
//! A game is either held exclusively by one owner or shared by any number
//! of read-only owners. Grants come out of a `GameLockTable` the
//! application creates once and passes down. A `GameLock` is a handle to a
//! grant: cloning it adds a reference, and the grant is given back when the
//! last clone is dropped or released.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};

use crate::configuration::config::MAX_LOCK_WAIT_MS;
use crate::error_handling::programmer_error;
use crate::error_handling::types::LockError;
use crate::storage::types::RowId;

struct Owner {
    thread: String,
    since: DateTime<Utc>,
}

impl Owner {
    fn current() -> Self {
        let thread = std::thread::current();
        Self {
            thread: thread.name().map(String::from).unwrap_or_else(|| format!("{:?}", thread.id())),
            since: Utc::now(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let age = Utc::now() - self.since;
        write!(
            f,
            "thread {} since {} ({}ms)",
            self.thread,
            self.since.format("%H:%M:%S%.3f"),
            age.num_milliseconds()
        )
    }
}

#[derive(Default)]
struct Grants {
    owners: Vec<Owner>,
    read_only: bool,
}

struct LockState {
    rowid: RowId,
    grants: Mutex<Grants>,
    released: Condvar,
}

impl LockState {
    fn grants(&self) -> MutexGuard<'_, Grants> {
        match self.grants.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn try_grant(grants: &mut Grants, read_only: bool) -> bool {
        let grant = grants.owners.is_empty() || (grants.read_only && read_only);
        if grant {
            grants.owners.push(Owner::current());
            grants.read_only = read_only;
        }
        grant
    }

    fn unlock(&self) {
        let mut grants = self.grants();
        if grants.owners.pop().is_none() {
            programmer_error(&format!("[{}] unlock of a game nobody holds", self.rowid));
            return;
        }
        trace!("[{}] unlocked, {} owners left", self.rowid, grants.owners.len());
        if grants.owners.is_empty() {
            self.released.notify_all();
        }
    }
}

type LockStates = Mutex<HashMap<RowId, Arc<LockState>>>;

fn states_guard(states: &LockStates) -> MutexGuard<'_, HashMap<RowId, Arc<LockState>>> {
    match states.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Table of lock states for the row ids currently locked or waited on.
#[derive(Default)]
pub struct GameLockTable {
    states: Arc<LockStates>,
}

impl GameLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, rowid: RowId) -> Arc<LockState> {
        states_guard(&self.states)
            .entry(rowid)
            .or_insert_with(|| {
                Arc::new(LockState {
                    rowid,
                    grants: Mutex::new(Grants::default()),
                    released: Condvar::new(),
                })
            })
            .clone()
    }

    /// Existing state only; queries must not grow the table.
    fn existing(&self, rowid: RowId) -> Option<Arc<LockState>> {
        states_guard(&self.states).get(&rowid).cloned()
    }

    /// Forgets `state` when nobody holds it and nobody else has a
    /// reference to it (a waiter, say).
    fn forget_if_idle(states: &LockStates, state: &Arc<LockState>) {
        let mut states = states_guard(states);
        // one reference in the table, one in the caller
        if Arc::strong_count(state) > 2 || !state.grants().owners.is_empty() {
            return;
        }
        let is_same = states
            .get(&state.rowid)
            .map(|s| Arc::ptr_eq(s, state))
            .unwrap_or(false);
        if is_same {
            states.remove(&state.rowid);
            trace!("[{}] lock state dropped; {} tracked", state.rowid, states.len());
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        states_guard(&self.states).len()
    }

    /// Exclusive lock, without waiting.
    pub fn try_lock(&self, rowid: RowId) -> Result<GameLock, LockError> {
        let state = self.state_for(rowid);
        let granted = LockState::try_grant(&mut state.grants(), false);
        if granted {
            Ok(GameLock::new(state, self.states.clone(), false))
        } else {
            self.log_refusal(&state);
            Err(LockError::Unavailable(rowid))
        }
    }

    fn lock_impl(&self, rowid: RowId, timeout: Duration, read_only: bool) -> Result<GameLock, LockError> {
        let timeout = if timeout > Duration::from_millis(MAX_LOCK_WAIT_MS) {
            programmer_error(&format!(
                "[{}] lock wait of {}ms exceeds {}ms",
                rowid,
                timeout.as_millis(),
                MAX_LOCK_WAIT_MS
            ));
            Duration::from_millis(MAX_LOCK_WAIT_MS)
        } else {
            timeout
        };

        let state = self.state_for(rowid);
        let deadline = Instant::now() + timeout;
        let mut grants = state.grants();
        while !LockState::try_grant(&mut grants, read_only) {
            let now = Instant::now();
            if now >= deadline {
                drop(grants);
                self.log_refusal(&state);
                Self::forget_if_idle(&self.states, &state);
                return Err(LockError::TimedOut(rowid));
            }
            grants = match state.released.wait_timeout(grants, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        drop(grants);
        Ok(GameLock::new(state, self.states.clone(), read_only))
    }

    fn log_refusal(&self, state: &LockState) {
        let grants = state.grants();
        if let Some(owner) = grants.owners.last() {
            debug!(
                "[{}] unable to lock; held by {} (ro: {}); would-be owner: {}",
                state.rowid,
                owner,
                grants.read_only,
                Owner::current()
            );
        }
    }

    /// Exclusive lock, waiting at most `timeout` (capped at one second).
    pub fn lock(&self, rowid: RowId, timeout: Duration) -> Result<GameLock, LockError> {
        self.lock_impl(rowid, timeout, false)
    }

    pub fn lock_ro(&self, rowid: RowId, timeout: Duration) -> Result<GameLock, LockError> {
        self.lock_impl(rowid, timeout, true)
    }

    pub fn is_locked(&self, rowid: RowId) -> bool {
        self.existing(rowid)
            .map(|state| !state.grants().owners.is_empty())
            .unwrap_or(false)
    }

    /// Who holds the lock on `rowid`, for diagnostics.
    pub fn holder(&self, rowid: RowId) -> Option<String> {
        let state = self.existing(rowid)?;
        let grants = state.grants();
        grants.owners.last().map(|owner| {
            format!(
                "{} ({} owner(s), ro: {})",
                owner,
                grants.owners.len(),
                grants.read_only
            )
        })
    }
}

/// A granted lock. Clones share the grant.
pub struct GameLock {
    state: Arc<LockState>,
    table: Arc<LockStates>,
    count: Arc<AtomicUsize>,
    read_only: bool,
}

impl GameLock {
    fn new(state: Arc<LockState>, table: Arc<LockStates>, read_only: bool) -> Self {
        debug!("[{}] locked (ro: {})", state.rowid, read_only);
        Self {
            state,
            table,
            count: Arc::new(AtomicUsize::new(1)),
            read_only,
        }
    }

    pub fn rowid(&self) -> RowId {
        self.state.rowid
    }

    pub fn can_write(&self) -> bool {
        if self.read_only {
            warn!("[{}] write attempted under a read-only lock", self.state.rowid);
        }
        !self.read_only
    }

    /// Adds a reference to the grant.
    pub fn retain(&self) -> GameLock {
        self.clone()
    }

    /// Drops this reference; the grant goes back with the last one.
    pub fn release(self) {
        drop(self)
    }

    pub fn ref_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Clone for GameLock {
    fn clone(&self) -> Self {
        self.count.fetch_add(1, Ordering::SeqCst);
        Self {
            state: self.state.clone(),
            table: self.table.clone(),
            count: self.count.clone(),
            read_only: self.read_only,
        }
    }
}

impl Drop for GameLock {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.unlock();
            GameLockTable::forget_if_idle(&self.table, &self.state);
        }
    }
}

impl fmt::Debug for GameLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLock")
            .field("rowid", &self.state.rowid)
            .field("read_only", &self.read_only)
            .field("count", &self.ref_count())
            .finish()
    }
}
