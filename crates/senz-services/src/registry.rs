//! Connection registry — the routing table.
//!
//! Maps registered names to live outbound write handles, shared by every
//! connection task. `put` is an unconditional upsert: uniqueness of a first
//! SHARE registration is a handler policy (checked against the key store
//! before the insert), while PING re-registration intentionally overwrites.
//! Operations on distinct names never block one another.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// A live connection's routing entry: its process-unique id and the sender
/// side of its single-consumer outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    conn_id: u64,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// The target connection's writer is gone; the frame was dropped.
#[derive(Debug, thiserror::Error)]
#[error("receiver connection is gone")]
pub struct ForwardError;

impl ConnectionEntry {
    pub fn new(conn_id: u64, outbound: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { conn_id, outbound }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Enqueue a frame on this connection's outbound queue.
    pub fn forward(&self, frame: Bytes) -> Result<(), ForwardError> {
        self.outbound.send(frame).map_err(|_| ForwardError)
    }
}

/// Registry of routable names. Shared across all connection tasks.
#[derive(Clone)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<String, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Unconditional upsert. A replaced entry belonged to a superseded
    /// connection whose teardown will no longer find its name here.
    pub fn put(&self, name: impl Into<String>, entry: ConnectionEntry) {
        let name = name.into();
        if let Some(old) = self.entries.insert(name.clone(), entry) {
            tracing::debug!(name = %name, old_conn = old.conn_id, "registry entry replaced");
        }
    }

    /// Look up a routable name. Absence is a normal, recoverable condition.
    pub fn get(&self, name: &str) -> Option<ConnectionEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Remove a name unconditionally. Removing an absent name is a no-op.
    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Remove a name only if it is still held by `conn_id`. Used at
    /// teardown so a superseded connection cannot evict its successor.
    /// Returns whether an entry was removed.
    pub fn remove_conn(&self, name: &str, conn_id: u64) -> bool {
        self.entries
            .remove_if(name, |_, entry| entry.conn_id == conn_id)
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Currently registered names.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
