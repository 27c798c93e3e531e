// src/connection/mod.rs

//! Manages the lifecycle of a single client connection: its read cycle, its
//! write path, and the capability surface exposed to the protocol task.

mod context;
mod guard;
mod handle;
mod handler;
mod writer;

pub use context::{ConnectionContext, TASK_LOG_TARGET};
pub use guard::ConnectionGuard;
pub use handle::{ConnectionHandle, Outbound};
pub use handler::Connection;
