//! In-memory key/value store with per-entry TTL
//!
//! Entries expire once `ttl` has elapsed since they were last written.
//! Expired entries read as absent immediately and are physically removed by
//! a sweep that runs at most once per TTL period, piggybacking on writes, or
//! by an explicit [`TtlStore::evict_expired`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use super::Clock;

/// Generic TTL-keyed key/value store
pub trait TtlStore<V>: Send + Sync {
    /// Value for `key`, unless absent or expired
    fn get(&self, key: &str) -> Option<&V>;

    /// Mutable access to the value for `key`, unless absent or expired.
    ///
    /// Does not refresh the TTL.
    fn get_mut(&mut self, key: &str) -> Option<&mut V>;

    /// Take the value for `key` out of the store, unless absent or expired
    fn remove(&mut self, key: &str) -> Option<V>;

    /// Insert or overwrite `key`, refreshing its TTL
    fn add(&mut self, key: String, value: V);

    /// Drop every expired entry, returning how many were removed
    fn evict_expired(&mut self) -> usize;

    /// All unexpired values, in no particular order
    fn list(&self) -> Vec<&V>;

    /// Number of unexpired values
    fn len(&self) -> usize {
        self.list().len()
    }

    /// Whether no unexpired value remains
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A stored value with its last write time
#[derive(Debug)]
struct Entry<V> {
    value: V,
    touched: Instant,
}

/// `HashMap`-backed [`TtlStore`]
#[derive(Debug)]
pub struct MemoryTtlStore<V> {
    /// Entries keyed by caller-supplied key
    entries: HashMap<String, Entry<V>>,
    /// Time-to-live measured from the last write
    ttl: Duration,
    /// Time source
    clock: Arc<dyn Clock>,
    /// When expired entries were last swept
    last_sweep: Instant,
}

impl<V> MemoryTtlStore<V> {
    /// Create an empty store
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
            last_sweep,
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| !Self::is_expired(entry, now, ttl));
        self.last_sweep = now;

        let evicted = before - self.entries.len();
        if evicted > 0 {
            trace!(evicted, "Evicted expired entries");
        }
        evicted
    }

    fn is_expired(entry: &Entry<V>, now: Instant, ttl: Duration) -> bool {
        now.duration_since(entry.touched) > ttl
    }
}

impl<V: Send + Sync> TtlStore<V> for MemoryTtlStore<V> {
    fn get(&self, key: &str) -> Option<&V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !Self::is_expired(entry, now, self.ttl))
            .map(|entry| &entry.value)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries
            .get_mut(key)
            .filter(|entry| !Self::is_expired(entry, now, ttl))
            .map(|entry| &mut entry.value)
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .remove(key)
            .filter(|entry| !Self::is_expired(entry, now, self.ttl))
            .map(|entry| entry.value)
    }

    fn add(&mut self, key: String, value: V) {
        let now = self.clock.now();
        if now.duration_since(self.last_sweep) >= self.ttl {
            self.sweep(now);
        }
        self.entries.insert(
            key,
            Entry {
                value,
                touched: now,
            },
        );
    }

    fn list(&self) -> Vec<&V> {
        let now = self.clock.now();
        self.entries
            .values()
            .filter(|entry| !Self::is_expired(entry, now, self.ttl))
            .map(|entry| &entry.value)
            .collect()
    }

    fn evict_expired(&mut self) -> usize {
        let now = self.clock.now();
        self.sweep(now)
    }
}
