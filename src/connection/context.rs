// src/connection/context.rs

//! Defines `ConnectionContext`, the capability surface a `Task` uses to act on
//! its connection and, through the registry, on other connections.

use super::handle::ConnectionHandle;
use crate::core::registry::ConnectionRegistry;
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

/// The tracing target that `ConnectionContext::log` writes to.
pub const TASK_LOG_TARGET: &str = "spindle::task_log";

/// Everything a task may do to the world, scoped to one connection.
///
/// Requests that change the connection's own cycle (`read`, `disconnect`) are
/// recorded here and applied by the driver once the current task call returns.
pub struct ConnectionContext<S> {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    state: Arc<S>,
    read_requested: bool,
    disconnect_requested: bool,
}

impl<S> ConnectionContext<S> {
    pub fn new(handle: ConnectionHandle, registry: Arc<ConnectionRegistry>, state: Arc<S>) -> Self {
        Self {
            handle,
            registry,
            state,
            read_requested: false,
            disconnect_requested: false,
        }
    }

    /// The connection's own handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Assigns a user-facing id. No uniqueness or format checks are made.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.handle.set_id(id);
    }

    pub fn id(&self) -> Option<String> {
        self.handle.id()
    }

    /// Requests that the next cycle waits for inbound bytes.
    pub fn read(&mut self) {
        self.read_requested = true;
    }

    /// Writes `payload` to this connection. Fire-and-forget.
    pub fn response(&self, payload: impl Into<Bytes>) {
        self.handle.response(payload);
    }

    /// Writes `payload` to the first registered connection whose id equals
    /// `target_id`. Silently does nothing if there is none.
    pub fn unicast(&self, target_id: &str, payload: impl Into<Bytes>) -> bool {
        self.registry.unicast(target_id, &payload.into())
    }

    /// Writes `payload` to every registered connection, this one included.
    pub fn broadcast(&self, payload: impl Into<Bytes>) -> usize {
        self.registry.broadcast(&payload.into())
    }

    /// Writes `message` to the server-wide log sink.
    pub fn log(&self, message: &[u8]) {
        let id = self.handle.id();
        info!(
            target: TASK_LOG_TARGET,
            session_id = self.handle.session_id(),
            id = id.as_deref().unwrap_or("-"),
            "{}",
            String::from_utf8_lossy(message)
        );
    }

    /// Requests termination. The connection stops once the current task call returns.
    pub fn disconnect(&mut self) {
        self.disconnect_requested = true;
    }

    /// Read-only access to the embedder's server-wide state.
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn is_read_requested(&self) -> bool {
        self.read_requested
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.disconnect_requested
    }

    /// Consumes a pending read request.
    pub(crate) fn take_read_request(&mut self) -> bool {
        std::mem::take(&mut self.read_requested)
    }
}
