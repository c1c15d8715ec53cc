//! Per-session bounded caches and the recycler that reuses them.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Fixed-capacity key/value store with least-recently-used eviction.
///
/// The LRU sits behind its own lock so lookups can run while the session map
/// is only read-locked.
pub(crate) struct BoundedCache<K, V> {
    lru: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Insert or overwrite, evicting the least recently used entry when full.
    pub(crate) fn put(&self, key: K, value: V) {
        let mut lru = self.lru.lock();
        if let Some((evicted, _)) = lru.push(key, value) {
            // `push` also hands back the old value when overwriting an existing key
            if !lru.contains(&evicted) {
                trace!(cache_size = lru.len(), "Evicted least recently used entry");
            }
        }
    }

    /// Look up a value and mark it as most recently used.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.lru.lock().get(key).cloned()
    }

    /// Check for a key without touching recency.
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.lru.lock().contains(key)
    }

    pub(crate) fn remove(&self, key: &K) -> bool {
        self.lru.lock().pop(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.lru.lock().len()
    }

    pub(crate) fn capacity(&self) -> NonZeroUsize {
        self.lru.lock().cap()
    }

    /// Drop every entry, keeping the capacity.
    pub(crate) fn clear(&mut self) {
        self.lru.get_mut().clear();
    }

    pub(crate) fn resize(&mut self, capacity: NonZeroUsize) {
        if self.capacity() != capacity {
            self.lru.get_mut().resize(capacity);
        }
    }
}

/// Free list of caches returned by ended sessions.
pub(crate) struct CacheRecycler<K, V> {
    idle: Mutex<Vec<BoundedCache<K, V>>>,
    max_idle: usize,
}

impl<K: Hash + Eq, V: Clone> CacheRecycler<K, V> {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Get an empty cache holding at most `capacity` entries.
    pub(crate) fn acquire(&self, capacity: NonZeroUsize) -> BoundedCache<K, V> {
        let reused = self.idle.lock().pop();
        match reused {
            Some(mut cache) => {
                let previous = cache.capacity();
                cache.resize(capacity);
                trace!(
                    previous = previous.get(),
                    capacity = capacity.get(),
                    "Reusing recycled cache"
                );
                cache
            }
            None => BoundedCache::new(capacity),
        }
    }

    /// Clear a cache and return it to the free list.
    pub(crate) fn release(&self, mut cache: BoundedCache<K, V>) {
        cache.clear();

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(cache);
        } else {
            debug!(max_idle = self.max_idle, "Cache recycler full, dropping cache");
        }
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let cache = BoundedCache::new(cap(10));
        cache.put("k1", 1);

        assert_eq!(cache.get(&"k1"), Some(1));
        assert_eq!(cache.get(&"k2"), None);
        assert!(cache.contains(&"k1"));
    }

    #[test]
    fn test_overwrite_keeps_size() {
        let cache = BoundedCache::new(cap(2));
        cache.put("k1", 1);
        cache.put("k1", 2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k1"), Some(2));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = BoundedCache::new(cap(2));
        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(3, "c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn test_get_updates_recency() {
        let cache = BoundedCache::new(cap(2));
        cache.put(1, "a");
        cache.put(2, "b");

        // 1 becomes most recently used, so 2 is evicted next
        assert_eq!(cache.get(&1), Some("a"));
        cache.put(3, "c");

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_remove() {
        let cache = BoundedCache::new(cap(2));
        cache.put(1, "a");

        assert!(cache.remove(&1));
        assert!(!cache.remove(&1));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut cache = BoundedCache::new(cap(3));
        for key in [1, 2, 3] {
            cache.put(key, key);
        }

        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.capacity(), cap(3));

        cache.resize(cap(1));
        assert_eq!(cache.capacity(), cap(1));
        cache.put(1, 1);
        cache.put(2, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_recycler_purges_on_release() {
        let recycler = CacheRecycler::<i32, i32>::new(4);

        let cache = recycler.acquire(cap(2));
        for key in [1, 2, 3] {
            cache.put(key, key * 10);
        }
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));

        recycler.release(cache);
        assert_eq!(recycler.idle_count(), 1);

        let cache = recycler.acquire(cap(2));
        assert_eq!(recycler.idle_count(), 0);
        for key in [1, 2, 3] {
            assert_eq!(cache.get(&key), None, "recycled cache should be empty");
        }
    }

    #[test]
    fn test_recycler_resizes() {
        let recycler = CacheRecycler::<i32, i32>::new(4);
        recycler.release(recycler.acquire(cap(2)));

        let cache = recycler.acquire(cap(3));
        assert_eq!(cache.capacity(), cap(3));
        for key in [1, 2, 3] {
            cache.put(key, key);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_recycler_respects_max_idle() {
        let recycler = CacheRecycler::<i32, i32>::new(0);
        recycler.release(recycler.acquire(cap(1)));
        assert_eq!(recycler.idle_count(), 0);
    }
}
