// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use super::handle::ConnectionHandle;
use crate::core::metrics;
use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Ensures a connection is stopped exactly once, whether its driver returns
/// normally, is cancelled, or panics. On drop the write pump is aborted too,
/// so a cancelled driver never leaves the transport open behind it.
pub struct ConnectionGuard<S> {
    handle: ConnectionHandle,
    state: Arc<ServerState<S>>,
    writer: AbortHandle,
}

impl<S> ConnectionGuard<S> {
    pub(crate) fn new(
        handle: ConnectionHandle,
        state: Arc<ServerState<S>>,
        writer: AbortHandle,
    ) -> Self {
        Self {
            handle,
            state,
            writer,
        }
    }

    /// Stops the connection: removes it from the registry and closes the
    /// transport. Idempotent; returns true only for the call that stopped it.
    pub(crate) fn stop(&self) -> bool {
        if !self.handle.mark_stopped() {
            return false;
        }
        if !self.state.registry.remove(&self.handle) {
            debug!(
                "Session {} was not in the registry upon cleanup.",
                self.handle.session_id()
            );
        }
        self.handle.close_transport();
        metrics::CONNECTED_CLIENTS.dec();
        self.state.stats.increment_closed_connections();
        debug!(
            "Session {}: connection from {} stopped after {:?}.",
            self.handle.session_id(),
            self.handle.addr(),
            self.handle.created().elapsed()
        );
        true
    }
}

impl<S> Drop for ConnectionGuard<S> {
    fn drop(&mut self) {
        self.stop();
        // A no-op once the pump has finished.
        self.writer.abort();
    }
}
