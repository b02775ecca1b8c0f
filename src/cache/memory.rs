//! In-memory cache adapters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{CacheKey, CacheStore, CachedValue};
use crate::config::CacheConfig;

/// Counters of a cache store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: CachedValue,
    stored_at: Instant,
}

/// Concurrent map with per-entry expiry.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_seconds))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let fresh = self.entries.get(key).and_then(|entry| {
            (entry.stored_at.elapsed() < self.ttl).then(|| entry.value.clone())
        });

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Cache hit: {key}");
                Some(value)
            }
            None => {
                // Expired entries are dropped on read.
                self.entries.remove_if(key, |_, entry| entry.stored_at.elapsed() >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Cache miss: {key}");
                None
            }
        }
    }

    fn set(&self, key: CacheKey, value: CachedValue) {
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, key: &CacheKey) {
        if self.entries.remove(key).is_some() {
            tracing::debug!("Invalidated cache entry {key}");
        }
    }

    fn invalidate_matching(&self, predicate: &dyn Fn(&CacheKey) -> bool) {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Invalidated {removed} cache entries");
        }
    }

    fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

/// Store that keeps nothing; used when caching is disabled.
#[derive(Debug, Default)]
pub struct NullCache;

impl CacheStore for NullCache {
    fn get(&self, _key: &CacheKey) -> Option<CachedValue> {
        None
    }

    fn set(&self, _key: CacheKey, _value: CachedValue) {}

    fn invalidate(&self, _key: &CacheKey) {}

    fn invalidate_matching(&self, _predicate: &dyn Fn(&CacheKey) -> bool) {}

    fn clear(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
