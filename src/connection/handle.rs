// src/connection/handle.rs

//! Defines `ConnectionHandle`, the cloneable, thread-safe face of a connection.

use bytes::Bytes;
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

/// A command for the write pump that owns a connection's write half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to write to the transport.
    Data(Bytes),
    /// Flush what was queued before this command, then shut the transport down.
    Close,
}

struct HandleInner {
    session_id: u64,
    addr: SocketAddr,
    /// The user-assigned id. Not unique; unicast picks the first match.
    id: RwLock<Option<String>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    stopped: AtomicBool,
    created: Instant,
}

/// A shared reference to one live connection.
///
/// Clones are cheap and all refer to the same connection. The registry keeps
/// one clone for as long as the connection is registered, and fan-out takes
/// temporary clones, so a connection's write path stays valid for as long as
/// anyone may still write to it.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Creates a handle whose writes are delivered to `outbound`.
    pub fn new(session_id: u64, addr: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                session_id,
                addr,
                id: RwLock::new(None),
                outbound,
                stopped: AtomicBool::new(false),
                created: Instant::now(),
            }),
        }
    }

    /// Creates a handle together with the receiving end of its write queue.
    pub fn channel(session_id: u64, addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(session_id, addr, tx), rx)
    }

    /// The identifier assigned by the acceptor. Unique per server run.
    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn created(&self) -> Instant {
        self.inner.created
    }

    /// Returns the user-assigned id, if one was set.
    pub fn id(&self) -> Option<String> {
        self.inner.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *self.inner.id.write() = Some(id.into());
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.inner.id.read().as_deref() == Some(id)
    }

    /// Queues `payload` for writing. Fire-and-forget: the eventual write
    /// result is never reported back.
    ///
    /// Returns false if the connection has already stopped, in which case the
    /// payload is dropped.
    pub fn response(&self, payload: impl Into<Bytes>) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.inner.outbound.send(Outbound::Data(payload.into())).is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Marks the connection as stopped. Returns true only for the first caller.
    pub(crate) fn mark_stopped(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::AcqRel)
    }

    /// Asks the write pump to flush and close the transport.
    pub(crate) fn close_transport(&self) {
        let _ = self.inner.outbound.send(Outbound::Close);
    }

    /// True if both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("session_id", &self.inner.session_id)
            .field("addr", &self.inner.addr)
            .field("id", &*self.inner.id.read())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
