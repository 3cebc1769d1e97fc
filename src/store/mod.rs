//! Per-service endpoint stores
//!
//! [`EndpointStore`] narrows a generic [`TtlStore`] to
//! [`WeightedEndpointStatus`] values. It carries no policy of its own.

mod clock;
mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl::{MemoryTtlStore, TtlStore};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::WeightedEndpointStatus;

/// Creates an empty [`EndpointStore`] with the given TTL
pub type StoreFactory = Arc<dyn Fn(Duration) -> EndpointStore + Send + Sync>;

/// Endpoint key → [`WeightedEndpointStatus`] store
pub struct EndpointStore {
    inner: Box<dyn TtlStore<WeightedEndpointStatus>>,
}

impl EndpointStore {
    /// Wrap a TTL store
    pub fn new(inner: impl TtlStore<WeightedEndpointStatus> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// In-memory store expiring entries `ttl` after their last write
    pub fn in_memory(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::new(MemoryTtlStore::new(ttl, clock))
    }

    /// Status stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WeightedEndpointStatus> {
        self.inner.get(key)
    }

    /// Mutable status stored under `key`, without refreshing its TTL
    pub fn get_mut(&mut self, key: &str) -> Option<&mut WeightedEndpointStatus> {
        self.inner.get_mut(key)
    }

    /// Take the status stored under `key` out of the store
    pub fn remove(&mut self, key: &str) -> Option<WeightedEndpointStatus> {
        self.inner.remove(key)
    }

    /// Insert or overwrite `key`, refreshing its TTL
    pub fn add(&mut self, key: impl Into<String>, value: WeightedEndpointStatus) {
        self.inner.add(key.into(), value);
    }

    /// All live statuses, unordered
    #[must_use]
    pub fn list(&self) -> Vec<&WeightedEndpointStatus> {
        self.inner.list()
    }

    /// Drop expired statuses, returning how many were removed
    pub fn evict_expired(&mut self) -> usize {
        self.inner.evict_expired()
    }

    /// Number of live statuses
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store holds no live status
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for EndpointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Factory producing [`MemoryTtlStore`]-backed endpoint stores
pub fn memory_store_factory(clock: Arc<dyn Clock>) -> StoreFactory {
    Arc::new(move |ttl| EndpointStore::in_memory(ttl, clock.clone()))
}
