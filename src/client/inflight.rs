//! A small registry of outstanding request/response correlations.
//!
//! CONNECT waits for CONNECTED; SEND/SUBSCRIBE/etc. with a `receipt`
//! header wait for the matching RECEIPT. Both are "register a slot, get
//! notified exactly once" — this is that slot, generalised over the key
//! and completion-value types.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::oneshot;

use crate::error::{Result, StompError};

/// Outstanding completions keyed by `K`, each resolved at most once with
/// a `Result<V>`.
pub struct PendingTable<K, V> {
    entries: HashMap<K, oneshot::Sender<Result<V>>>,
}

impl<K: Eq + Hash, V> PendingTable<K, V> {
    pub fn new() -> Self {
        PendingTable { entries: HashMap::new() }
    }

    /// Register a new wait for `key`, replacing any prior (abandoned) one.
    pub fn register(&mut self, key: K) -> oneshot::Receiver<Result<V>> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(key, tx);
        rx
    }

    /// Resolve the wait for `key` with a success value. Returns `false` if
    /// nothing was waiting.
    pub fn complete(&mut self, key: &K, value: V) -> bool {
        match self.entries.remove(key) {
            Some(tx) => {
                let _ = tx.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding wait with `reason`, e.g. on connection loss.
    pub fn drain_cancel(&mut self, reason: &str) {
        for (_, tx) in self.entries.drain() {
            let _ = tx.send(Err(StompError::cancelled(reason)));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for PendingTable<K, V> {
    fn default() -> Self {
        PendingTable::new()
    }
}
