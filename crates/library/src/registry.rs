//! Registry of live locations.
//!
//! In a transactional deployment two instances of the same location could
//! each hand out overlays that, committed one after the other, apply
//! divergent writes to the same storage root. The registry keeps one live
//! instance per location id so every lookup gets the same one.
//!
//! Eviction doesn't invalidate anything already handed out; it only means the
//! next lookup of the evicted id constructs a fresh instance. Keeping a
//! transactional handle open while its location is evicted gives up the
//! single-instance guarantee, and is the caller's responsibility to avoid.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::id::LocationId;
use crate::location::LocationHandle;

/// Capacity used by transactional deployments that don't configure one.
pub const REGISTRY_CACHE_SIZE: usize = 10_000;

pub struct Registry {
    cache: Option<Mutex<LruCache<LocationId, LocationHandle>>>,
}

impl Registry {
    /// Create a registry caching at most `capacity` locations.
    ///
    /// A transactional deployment always caches: a capacity of zero is
    /// replaced by [`REGISTRY_CACHE_SIZE`]. Otherwise a capacity of zero
    /// disables caching and every lookup constructs a new location.
    pub fn new(capacity: usize, transactional: bool) -> Self {
        let capacity = if transactional && capacity < 1 { REGISTRY_CACHE_SIZE } else { capacity };
        Self {
            cache: NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(cache: &Mutex<LruCache<LocationId, LocationHandle>>) -> MutexGuard<'_, LruCache<LocationId, LocationHandle>> {
        cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Effective capacity; zero when caching is disabled.
    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| Self::lock(cache).cap().get())
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| Self::lock(cache).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached location for `id`, marking it most recently used, or
    /// build one with `create` and cache it, evicting the least recently used
    /// location if the registry is full.
    ///
    /// The lock is held while `create` runs, so concurrent lookups of the
    /// same id never build two instances.
    pub fn lookup_or_create<F>(&self, id: &LocationId, create: F) -> Result<LocationHandle>
    where
        F: FnOnce() -> Result<LocationHandle>,
    {
        let Some(cache) = &self.cache else {
            return create();
        };
        let mut cache = Self::lock(cache);
        if let Some(location) = cache.get(id) {
            return Ok(location.clone());
        }
        let location = create()?;
        if let Some((evicted, _)) = cache.push(id.clone(), location.clone()) {
            tracing::debug!(location = %evicted, "Evicted location from registry");
        }
        Ok(location)
    }

    /// Drop every cached location.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            Self::lock(cache).clear();
        }
    }
}
