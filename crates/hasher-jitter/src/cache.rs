//! Recency cache for resolved jitter values

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::types::JitterVector;

/// A jitter resolution remembered by hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedJitter {
    /// Resolved jitter
    pub jitter: JitterVector,
    /// Whether the original resolution hit the knowledge base
    pub found: bool,
}

/// Fixed-capacity LRU map from a 32-bit hash key to a resolved jitter.
///
/// Guarded by its own lock; every `get` promotes recency, so reads mutate.
/// A capacity of zero disables caching entirely.
pub struct JitterCache {
    inner: Option<Mutex<LruCache<u32, CachedJitter>>>,
}

impl JitterCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Look up and promote an entry
    pub fn get(&self, key: u32) -> Option<CachedJitter> {
        self.inner.as_ref()?.lock().get(&key).copied()
    }

    /// Insert or refresh an entry, evicting the least recently used one when full
    pub fn put(&self, key: u32, value: CachedJitter) {
        if let Some(cache) = &self.inner {
            cache.lock().put(key, value);
        }
    }

    /// Drop one entry
    pub fn remove(&self, key: u32) {
        if let Some(cache) = &self.inner {
            cache.lock().pop(&key);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.lock().clear();
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.lock().len())
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries (zero when disabled)
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.lock().cap().get())
    }
}
