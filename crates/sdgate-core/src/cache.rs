//! Optional in-memory cache capability.
//!
//! The backend uses a cache only to keep open file handles around between
//! requests; nothing depends on an entry still being present. Two variants
//! exist: `NoopCache`, which stores nothing, and `LruCache`, a bounded
//! least-recently-used map.

use std::hash::Hash;
use std::num::NonZeroUsize;

use parking_lot::Mutex;
use tracing::debug;

/// Callback run for every value that leaves the cache.
pub type EvictFn<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Key/value cache shared between connection tasks.
pub trait Cache<K, V>: Send + Sync {
    fn name(&self) -> &str;

    /// Look up `key`, promoting it on hit.
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace `key`; may evict the least recently used entry.
    fn set(&self, key: K, value: V);

    /// Remove `key`; returns whether it was present.
    fn delete(&self, key: &K) -> bool;

    /// Check presence without promoting.
    fn exists(&self, key: &K) -> bool;

    fn keys(&self) -> Vec<K>;

    /// Drop every entry.
    fn purge(&self);

    /// Register the callback run on eviction, deletion and purge.
    fn on_evict(&self, callback: EvictFn<K, V>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache that never holds anything.
#[derive(Debug, Default)]
pub struct NoopCache;

impl<K, V> Cache<K, V> for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn set(&self, _key: K, _value: V) {}

    fn delete(&self, _key: &K) -> bool {
        false
    }

    fn exists(&self, _key: &K) -> bool {
        false
    }

    fn keys(&self) -> Vec<K> {
        Vec::new()
    }

    fn purge(&self) {}

    fn on_evict(&self, _callback: EvictFn<K, V>) {}

    fn len(&self) -> usize {
        0
    }
}

/// Bounded LRU cache.
///
/// `lru::LruCache` is not `Sync`, so it lives behind a mutex. Eviction
/// callbacks run after the lock is released.
pub struct LruCache<K: Hash + Eq, V> {
    entries: Mutex<lru::LruCache<K, V>>,
    evict: Mutex<Option<EvictFn<K, V>>>,
    capacity: usize,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(cap)),
            evict: Mutex::new(None),
            capacity: cap.get(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn notify(&self, dropped: &[(K, V)]) {
        if dropped.is_empty() {
            return;
        }
        if let Some(callback) = self.evict.lock().as_ref() {
            for (k, v) in dropped {
                callback(k, v);
            }
        }
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn name(&self) -> &str {
        "lru"
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: K, value: V) {
        let displaced = self.entries.lock().push(key, value);
        if let Some(entry) = displaced {
            self.notify(&[entry]);
        }
    }

    fn delete(&self, key: &K) -> bool {
        let removed = self.entries.lock().pop_entry(key);
        match removed {
            Some(entry) => {
                self.notify(&[entry]);
                true
            }
            None => false,
        }
    }

    fn exists(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    fn keys(&self) -> Vec<K> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    fn purge(&self) {
        let dropped: Vec<(K, V)> = {
            let mut entries = self.entries.lock();
            let mut dropped = Vec::with_capacity(entries.len());
            while let Some(entry) = entries.pop_lru() {
                dropped.push(entry);
            }
            dropped
        };
        debug!("cache: purged {} entries", dropped.len());
        self.notify(&dropped);
    }

    fn on_evict(&self, callback: EvictFn<K, V>) {
        *self.evict.lock() = Some(callback);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_noop_cache_stores_nothing() {
        let cache = NoopCache;
        Cache::<u32, u32>::set(&cache, 1, 1);
        assert_eq!(Cache::<u32, u32>::get(&cache, &1), None);
        assert!(!Cache::<u32, u32>::exists(&cache, &1));
        assert!(Cache::<u32, u32>::keys(&cache).is_empty());
    }

    #[test]
    fn test_lru_get_set() {
        let cache: LruCache<String, u32> = LruCache::new(4);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert!(cache.exists(&"b".to_string()));
        assert_eq!(cache.len(), 2);
        assert!(cache.delete(&"a".to_string()));
        assert!(!cache.delete(&"a".to_string()));
        assert_eq!(cache.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let cache: LruCache<u32, u32> = LruCache::new(2);
        let counter = evicted.clone();
        cache.on_evict(Box::new(move |k, _| {
            assert_eq!(*k, 2);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.set(1, 10);
        cache.set(2, 20);
        // touch 1 so that 2 becomes the eviction candidate
        assert_eq!(cache.get(&1), Some(10));
        cache.set(3, 30);

        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert!(cache.exists(&1));
        assert!(!cache.exists(&2));
        assert!(cache.exists(&3));
    }

    #[test]
    fn test_lru_purge_notifies() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let cache: LruCache<u32, u32> = LruCache::new(8);
        let counter = evicted.clone();
        cache.on_evict(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        for i in 0..5 {
            cache.set(i, i);
        }
        cache.purge();
        assert!(cache.is_empty());
        assert_eq!(evicted.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_lru_zero_capacity_is_clamped() {
        let cache: LruCache<u32, u32> = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(1, 1);
        cache.set(2, 2);
        assert_eq!(cache.len(), 1);
    }
}
