// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::registry::ConnectionRegistry;
use std::sync::Arc;

/// The central struct holding all shared, server-wide state.
///
/// Wrapped in an `Arc` and handed to every connection. `shared` is the
/// embedder's own state: the core never inspects it and only forwards a
/// read-only reference to each connection's task.
#[derive(Debug)]
pub struct ServerState<S> {
    /// The configuration the server was started with.
    pub config: Config,
    /// Every connection currently reachable for fan-out.
    pub registry: Arc<ConnectionRegistry>,
    /// Embedder-defined state exposed to tasks through `ConnectionContext::state`.
    pub shared: Arc<S>,
    /// Holds all server-wide statistics.
    pub stats: StatsState,
}

impl<S> ServerState<S> {
    /// Creates the shared state with an empty registry.
    pub fn new(config: Config, shared: S) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            shared: Arc::new(shared),
            stats: StatsState::new(),
        }
    }
}
