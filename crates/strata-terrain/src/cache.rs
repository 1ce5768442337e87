//! Bounded least-recently-used cache shared by the region, biome and
//! placement stores.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

struct CacheEntry<V> {
    value: V,
    /// Logical clock value of the most recent access.
    last_access: u64,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Access time to key, oldest first.
    recency: BTreeMap<u64, K>,
    max_entries: usize,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> CacheInner<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &K) -> Option<&mut V> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_access);
        entry.last_access = now;
        self.recency.insert(now, key.clone());
        Some(&mut entry.value)
    }

    fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let now = self.tick();
        let mut displaced = Vec::new();
        if let Some(old) = self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                last_access: now,
            },
        ) {
            self.recency.remove(&old.last_access);
            displaced.push((key.clone(), old.value));
        }
        self.recency.insert(now, key);
        let limit = self.max_entries;
        displaced.extend(self.evict_to(limit));
        displaced
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        Some(entry.value)
    }

    fn evict_to(&mut self, limit: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.entries.len() > limit {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                evicted.push((key, entry.value));
            }
        }
        evicted
    }

    fn drain(&mut self) -> Vec<(K, V)> {
        self.recency.clear();
        self.entries.drain().map(|(k, e)| (k, e.value)).collect()
    }
}

/// A mutex-guarded key/value store holding at most `max_entries` values.
///
/// Operations that drop values (`put`, `set_max_entries`, `clear`, ...)
/// hand them back so owners can release backend resources.
pub struct RegionCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
}

impl<K: Eq + Hash + Clone, V> RegionCache<K, V> {
    /// `max_entries` below 1 is raised to 1.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                max_entries: max_entries.max(1),
                clock: 0,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the cache for a multi-step operation.
    pub fn lock(&self) -> CacheGuard<'_, K, V> {
        CacheGuard { inner: self.inner() }
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner().touch(key).map(|v| v.clone())
    }

    /// Look up a value without touching its recency.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner().entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace a value. Returns whatever left the cache: the
    /// replaced value for `key`, and the least recently used entries when
    /// the cache is over capacity.
    pub fn put(&self, key: K, value: V) -> Vec<(K, V)> {
        self.inner().put(key, value)
    }

    /// Membership test. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner().entries.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner().remove(key)
    }

    /// Remove every entry whose key matches `pred`.
    pub fn remove_where(&self, mut pred: impl FnMut(&K) -> bool) -> Vec<(K, V)> {
        let mut inner = self.inner();
        let keys: Vec<K> = inner.entries.keys().filter(|k| pred(k)).cloned().collect();
        keys.into_iter()
            .filter_map(|k| inner.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Mutate a value in place under the cache lock and mark it most recently used.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.inner().touch(key).map(f)
    }

    pub fn clear(&self) -> Vec<(K, V)> {
        self.inner().drain()
    }

    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.inner().max_entries
    }

    /// Change the capacity, evicting down to it immediately.
    pub fn set_max_entries(&self, max_entries: usize) -> Vec<(K, V)> {
        let mut inner = self.inner();
        inner.max_entries = max_entries.max(1);
        let limit = inner.max_entries;
        inner.evict_to(limit)
    }
}

/// Exclusive access to a [`RegionCache`], used to clear several caches
/// while holding all of their locks, or to check and insert atomically.
pub struct CacheGuard<'a, K, V> {
    inner: MutexGuard<'a, CacheInner<K, V>>,
}

impl<K: Eq + Hash + Clone, V> CacheGuard<'_, K, V> {
    pub fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.inner.put(key, value)
    }

    pub fn clear(&mut self) -> Vec<(K, V)> {
        self.inner.drain()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_put_and_get() {
        let cache = RegionCache::new(4);
        assert!(cache.put(1, "a").is_empty());
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = RegionCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        // Touch 1 so 2 becomes the oldest.
        assert_eq!(cache.get(&1), Some(10));
        let evicted = cache.put(3, 30);
        assert_eq!(evicted, vec![(2, 20)]);
        assert!(cache.contains(&1));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_contains_and_peek_do_not_touch_recency() {
        let cache = RegionCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        assert!(cache.contains(&1));
        assert_eq!(cache.peek(&1), Some(10));
        let evicted = cache.put(3, 30);
        assert_eq!(evicted, vec![(1, 10)]);
    }

    #[test]
    fn test_replacing_returns_old_value() {
        let cache = RegionCache::new(2);
        cache.put("k", 1);
        let displaced = cache.put("k", 2);
        assert_eq!(displaced, vec![("k", 1)]);
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shrinking_evicts_immediately() {
        let cache = RegionCache::new(5);
        for i in 0..5 {
            cache.put(i, i);
        }
        let evicted = cache.set_max_entries(2);
        assert_eq!(evicted.len(), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn test_large_shrink_keeps_most_recent() {
        let cache = RegionCache::new(500);
        for i in 0..500 {
            cache.put(i, i);
        }
        // Touch a few old entries so they outlive newer ones.
        for i in [3, 1, 7] {
            cache.get(&i);
        }
        cache.update(&0, |v| *v += 1);
        let evicted = cache.set_max_entries(4);
        assert_eq!(evicted.len(), 496);
        // Evicted oldest first.
        assert_eq!(evicted[0], (2, 2));
        assert_eq!(evicted[495], (499, 499));
        for k in [3, 1, 7, 0] {
            assert!(cache.contains(&k));
        }
        cache.remove(&1);
        cache.put(600, 600);
        cache.put(601, 601);
        assert!(!cache.contains(&3));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_guard_put_evicts_like_put() {
        let cache = RegionCache::new(1);
        cache.put(1, 'a');
        let evicted = cache.lock().put(2, 'b');
        assert_eq!(evicted, vec![(1, 'a')]);
        assert_eq!(cache.get(&2), Some('b'));
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let cache = RegionCache::new(0);
        cache.put(1, 1);
        cache.put(2, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.max_entries(), 1);
    }

    #[test]
    fn test_update_mutates_in_place() {
        let cache = RegionCache::new(2);
        cache.put(1, vec![1, 2]);
        let len = cache.update(&1, |v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, Some(3));
        assert_eq!(cache.get(&1), Some(vec![1, 2, 3]));
        assert_eq!(cache.update(&9, |v| v.len()), None);
    }

    #[test]
    fn test_remove_where_and_clear() {
        let cache = RegionCache::new(10);
        for i in 0..6 {
            cache.put(i, i * 10);
        }
        let mut removed = cache.remove_where(|k| k % 2 == 0);
        removed.sort_unstable();
        assert_eq!(removed, vec![(0, 0), (2, 20), (4, 40)]);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.clear().len(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_guard_clears_under_lock() {
        let a = RegionCache::new(4);
        let b = RegionCache::new(4);
        a.put(1, 'a');
        b.put(2, 'b');
        {
            let mut ga = a.lock();
            let mut gb = b.lock();
            assert_eq!(ga.len(), 1);
            ga.clear();
            gb.clear();
            assert!(ga.is_empty() && gb.is_empty());
        }
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_never_exceeds_capacity_under_random_ops() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let cache = RegionCache::new(16);
        for step in 0..2_000 {
            let key: u32 = rng.random_range(0..64);
            match rng.random_range(0..4) {
                0 | 1 => {
                    cache.put(key, step);
                }
                2 => {
                    cache.get(&key);
                }
                _ => {
                    if step % 97 == 0 {
                        cache.set_max_entries(rng.random_range(1..32));
                    } else {
                        cache.remove(&key);
                    }
                }
            }
            assert!(cache.len() <= cache.max_entries());
        }
    }
}
