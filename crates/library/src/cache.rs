//! Least-recently-used cache of repository objects.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use crate::id::RepositoryId;
use crate::object::ObjectId;

pub use stacks_config::OBJECT_CACHE_SIZE;

type Key = (RepositoryId, ObjectId);

struct Inner {
    cache: LruCache<Key, Arc<[u8]>>,
    hits: usize,
    misses: usize,
}

/// Object cache shared by the repositories of one location.
///
/// Entries are keyed by repository as well as object id: two repositories
/// may share a cache, but an object stored in one must never appear to exist
/// in the other.
pub struct ObjectCache {
    inner: Mutex<Inner>,
}

impl ObjectCache {
    /// Create a cache holding at most `capacity` objects. A capacity of zero
    /// selects [`OBJECT_CACHE_SIZE`].
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(OBJECT_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Every critical section leaves the LRU consistent, so a panic while
        // holding the lock can't have corrupted it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, repository: &RepositoryId, id: &ObjectId) -> Option<Arc<[u8]>> {
        let mut inner = self.lock();
        match inner.cache.get(&(repository.clone(), *id)).cloned() {
            Some(data) => {
                inner.hits += 1;
                Some(data)
            },
            None => {
                inner.misses += 1;
                None
            },
        }
    }

    pub fn put(&self, repository: &RepositoryId, id: ObjectId, data: Arc<[u8]>) {
        self.lock().cache.put((repository.clone(), id), data);
    }

    pub fn len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cache.cap().get()
    }

    /// Cache hits and misses since creation.
    pub fn stats(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.hits, inner.misses)
    }

    pub fn clear(&self) {
        self.lock().cache.clear();
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(OBJECT_CACHE_SIZE)
    }
}
