//! Session-scoped shared state.
//!
//! One client session owns one [`SessionState`]: a string-keyed map of
//! JSON values that concurrent tasks read and update under a lock.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::Mutex;

/// String-keyed state shared by the tasks of one client session.
///
/// All access goes through [`SessionState::with_lock`]; the single-key
/// helpers are wrappers over it. The closure runs synchronously while the
/// lock is held, so a critical section can never suspend mid-update, and
/// the lock is released whether the closure returns or unwinds. Two
/// separate calls do not compose atomically; use `with_lock` for
/// read-modify-write sequences.
///
/// Waiters acquire in FIFO order. The state lives only as long as its
/// owner; nothing is persisted.
#[derive(Debug, Default)]
pub struct SessionState {
    entries: Mutex<HashMap<String, Value>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` with exclusive access to the session map and return its
    /// value.
    pub async fn with_lock<F, R>(&self, op: F) -> R
    where
        F: FnOnce(&mut HashMap<String, Value>) -> R,
    {
        let mut entries = self.entries.lock().await;
        op(&mut entries)
    }

    /// Read a single value.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.with_lock(|entries| entries.get(key).cloned()).await
    }

    /// Store a value, replacing any previous one under the key.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.with_lock(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    /// Drop a key, returning the value it held.
    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.with_lock(|entries| entries.remove(key)).await
    }
}
