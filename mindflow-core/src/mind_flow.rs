//! Bounded cache of the character's private reasoning.
//!
//! [`BoundedFifoMap`] is the reusable primitive: an insertion-ordered map
//! with a fixed capacity that evicts exactly one oldest entry per insertion
//! crossing the bound. [`MindFlowCache`] specialises it to turn ids.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use tracing::debug;

use crate::types::UnitId;

// ---------------------------------------------------------------------------
// BoundedFifoMap
// ---------------------------------------------------------------------------

/// Insertion-ordered map with FIFO eviction.
///
/// Invariant: `order.len() == entries.len()` and both hold at most
/// `capacity` keys once [`Self::evict_if_over_capacity`] has run.
#[derive(Debug, Clone)]
pub struct BoundedFifoMap<K, V> {
    capacity: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> BoundedFifoMap<K, V> {
    /// Create an empty map holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            entries: HashMap::with_capacity(capacity + 1),
        }
    }

    /// Insert without evicting. Re-inserting a key moves it to the back.
    pub fn push(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
    }

    /// Insert and evict the oldest entry if the bound was crossed.
    ///
    /// Returns the evicted key and value, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.push(key, value);
        self.evict_if_over_capacity()
    }

    /// Pop the single oldest entry when the map holds more than `capacity`.
    pub fn evict_if_over_capacity(&mut self) -> Option<(K, V)> {
        if self.order.len() <= self.capacity {
            return None;
        }
        let oldest = self.order.pop_front()?;
        let value = self.entries.remove(&oldest)?;
        Some((oldest, value))
    }

    /// Remove `key` if present. Absence is not an error.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// The most recently inserted entry.
    #[must_use]
    pub fn newest(&self) -> Option<(&K, &V)> {
        let key = self.order.back()?;
        self.entries.get(key).map(|v| (key, v))
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// MindFlowCache
// ---------------------------------------------------------------------------

/// Private reasoning keyed by the turn id of the emitted line.
#[derive(Debug, Clone)]
pub struct MindFlowCache {
    inner: BoundedFifoMap<UnitId, String>,
}

impl MindFlowCache {
    /// Create a cache bounded to `max_context_length` entries.
    #[must_use]
    pub fn new(max_context_length: usize) -> Self {
        Self {
            inner: BoundedFifoMap::new(max_context_length),
        }
    }

    /// Store the reasoning for `turn_id` and evict the oldest entry if the
    /// cache is now over capacity. Empty reasoning is not stored.
    pub fn record(&mut self, turn_id: UnitId, reasoning: impl Into<String>) {
        let reasoning = reasoning.into();
        if reasoning.is_empty() {
            return;
        }
        if let Some((evicted, _)) = self.inner.insert(turn_id, reasoning) {
            debug!(turn_id = %evicted, "mind-flow entry evicted");
        }
    }

    /// Discard the reasoning for a turn about to be regenerated.
    pub fn consume(&mut self, turn_id: &UnitId) -> Option<String> {
        self.inner.remove(turn_id)
    }

    /// Pop the oldest entry if over capacity.
    pub fn evict_if_over_capacity(&mut self) -> Option<(UnitId, String)> {
        self.inner.evict_if_over_capacity()
    }

    /// Reasoning stored for `turn_id`.
    #[must_use]
    pub fn get(&self, turn_id: &UnitId) -> Option<&str> {
        self.inner.get(turn_id).map(String::as_str)
    }

    /// The most recently recorded reasoning.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.inner.newest().map(|(_, v)| v.as_str())
    }

    /// Turn ids from oldest to newest.
    pub fn turn_ids(&self) -> impl Iterator<Item = &UnitId> {
        self.inner.keys()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
