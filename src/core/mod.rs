// src/core/mod.rs

//! The protocol-agnostic core: the task contract, the connection registry and
//! the state shared between the acceptor and every connection.

pub mod errors;
pub mod metrics;
pub mod registry;
pub mod state;
pub mod task;

pub use errors::SpindleError;
pub use registry::ConnectionRegistry;
pub use task::{Action, Task};
