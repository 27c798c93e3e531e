// src/core/registry.rs

//! The registry of live connections used for fan-out (broadcast and unicast).
//!
//! All membership changes and iterations go through a single mutex. Fan-out
//! callbacks never run while that mutex is held: iteration first copies the
//! matching handles under the lock, releases it, and only then invokes the
//! callback. A callback may therefore re-enter the registry (for example by
//! disconnecting a peer) without deadlocking.

use super::metrics;
use crate::connection::ConnectionHandle;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

/// A mutex-guarded set of live connection handles.
///
/// Entries are keyed by session id, which the acceptor assigns monotonically,
/// so iteration order is the order in which connections were accepted.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<BTreeMap<u64, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a connection. Returns false if a connection with the same
    /// session id was already present (the existing entry is kept).
    pub fn add(&self, connection: ConnectionHandle) -> bool {
        let mut connections = self.connections.lock();
        let session_id = connection.session_id();
        if connections.contains_key(&session_id) {
            return false;
        }
        connections.insert(session_id, connection);
        true
    }

    /// Removes a connection if it is present.
    ///
    /// Removing an absent handle is a no-op: a disconnect can race a concurrent
    /// cleanup pass. Returns true only for the call that actually removed it.
    pub fn remove(&self, connection: &ConnectionHandle) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(&connection.session_id()) {
            Some(existing) if existing.ptr_eq(connection) => {
                connections.remove(&connection.session_id());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, connection: &ConnectionHandle) -> bool {
        self.connections
            .lock()
            .get(&connection.session_id())
            .is_some_and(|existing| existing.ptr_eq(connection))
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Returns a consistent copy of every registered handle.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().values().cloned().collect()
    }

    /// Invokes `func` once per registered connection, as seen at call time.
    /// Returns the number of invocations.
    pub fn for_each<F>(&self, mut func: F) -> usize
    where
        F: FnMut(&ConnectionHandle),
    {
        let snapshot = self.snapshot();
        for connection in &snapshot {
            func(connection);
        }
        snapshot.len()
    }

    /// Invokes `func` for every registered connection satisfying `predicate`.
    ///
    /// The predicate is evaluated under the registry lock and must not call
    /// back into the registry.
    pub fn for_each_if<P, F>(&self, mut predicate: P, mut func: F) -> usize
    where
        P: FnMut(&ConnectionHandle) -> bool,
        F: FnMut(&ConnectionHandle),
    {
        let matching: Vec<ConnectionHandle> = self
            .connections
            .lock()
            .values()
            .filter(|connection| predicate(*connection))
            .cloned()
            .collect();
        for connection in &matching {
            func(connection);
        }
        matching.len()
    }

    /// Returns the first connection, in registry order, satisfying `predicate`.
    pub fn find_first<P>(&self, mut predicate: P) -> Option<ConnectionHandle>
    where
        P: FnMut(&ConnectionHandle) -> bool,
    {
        self.connections
            .lock()
            .values()
            .find(|connection| predicate(*connection))
            .cloned()
    }

    /// Writes `payload` to every registered connection, including the sender.
    /// Returns the number of connections the write was issued to.
    pub fn broadcast(&self, payload: &Bytes) -> usize {
        let mut delivered = 0;
        self.for_each(|connection| {
            if connection.response(payload.clone()) {
                delivered += 1;
            }
        });
        metrics::FANOUT_WRITES_TOTAL.inc_by(delivered as f64);
        debug!(
            "Broadcast of {} bytes issued to {} connections.",
            payload.len(),
            delivered
        );
        delivered
    }

    /// Writes `payload` to the first connection whose id equals `target_id`.
    ///
    /// Duplicate ids are permitted; only the earliest-accepted match receives
    /// the write. A missing target is silently ignored. Returns whether a
    /// write was issued.
    pub fn unicast(&self, target_id: &str, payload: &Bytes) -> bool {
        match self.find_first(|connection| connection.has_id(target_id)) {
            Some(connection) => {
                let issued = connection.response(payload.clone());
                if issued {
                    metrics::FANOUT_WRITES_TOTAL.inc();
                }
                issued
            }
            None => {
                debug!("Unicast target '{}' not found, dropping message.", target_id);
                false
            }
        }
    }
}
