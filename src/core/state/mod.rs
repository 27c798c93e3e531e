// src/core/state/mod.rs

//! Defines the central `ServerState` struct shared by the acceptor and every connection.

mod core;
mod stats;

pub use core::ServerState;
pub use stats::StatsState;
