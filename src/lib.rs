pub mod configuration;
pub use configuration::*;

pub mod controller;

pub mod engine;

pub mod error_handling;

pub mod push;

pub mod session_management;

pub mod storage;
