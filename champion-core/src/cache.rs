//! Memoization for selection results and resolved checkpoint handles.
//!
//! Entries never expire on their own; invalidation is explicit and
//! caller-triggered. A hit must be value-identical to a fresh computation.

use crate::resolve::CheckpointHandle;
use crate::selection::SelectionResult;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// A concurrency-safe key → value memo table.
///
/// Racing writers for the same key converge on a single stored value: the
/// first write wins and later writes return the already-stored value.
#[derive(Debug)]
pub struct Memo<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Memo<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a value unless the key is already populated; returns the value
    /// that ended up in the table.
    pub fn insert(&self, key: K, value: V) -> V {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(value)
            .clone()
    }

    /// Return the cached value or compute, store, and return it. The
    /// computation runs outside the lock; concurrent computations for the
    /// same key converge on whichever write lands first.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = compute()?;
        Ok(self.insert(key.clone(), value))
    }

    /// Drop one entry; true when something was removed.
    pub fn invalidate(&self, key: &K) -> bool {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two cache tables of the selection subsystem: study-set fingerprint →
/// selection result, and trial key hash → resolved checkpoint handle.
#[derive(Debug, Default)]
pub struct SelectionCache {
    pub selections: Memo<String, SelectionResult>,
    pub resolutions: Memo<String, CheckpointHandle>,
}

impl SelectionCache {
    pub fn new() -> Self {
        Self {
            selections: Memo::new(),
            resolutions: Memo::new(),
        }
    }

    /// Drop both tables, e.g. after a batch of studies changed.
    pub fn clear(&self) {
        self.selections.clear();
        self.resolutions.clear();
    }
}
