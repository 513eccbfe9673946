//! Error types shared across the crate, plus the handling policy for
//! programmer errors.
//!
//! Misuse of the session layer (a handle used after release, a command sent
//! to a stopped worker, a reference count going negative) is a bug in the
//! caller. Debug builds crash on it; release builds log it and carry on.

pub mod types;

use log::error;

/// Reports a programmer error.
///
/// Always logged at `error!`; also trips a `debug_assert!` so debug builds and
/// tests fail loudly.
pub fn programmer_error(msg: &str) {
    error!("programmer error: {}", msg);
    debug_assert!(false, "{}", msg);
}
