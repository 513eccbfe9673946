//! Native engine boundary.
//!
//! - `native`: the `Engine` and `NativeGame` traits every engine implements.
//! - `types`: data passed across the boundary.
//! - `handle`: reference-counted ownership of one live game.
//! - `dictionary`: opening the dictionaries a game needs.
//! - `sim_engine`: an in-process engine for the binary and tests.

pub mod dictionary;
pub mod handle;
pub mod native;
pub mod sim_engine;
pub mod types;

pub use dictionary::{DictPairs, DictStore};
pub use handle::SessionHandle;
pub use native::{Engine, NativeGame};
pub use sim_engine::SimEngine;
