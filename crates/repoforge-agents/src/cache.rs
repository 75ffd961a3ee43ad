//! Explicit TTL+LRU cache (`spec.md` §3, §5, §9: "closures over mutable
//! caches" traded for an owned component with an explicit capacity and
//! eviction policy). Backs both the response cache and the routing cache.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A capacity-bounded, TTL-expiring cache. `get` treats an expired entry
/// as a miss and evicts it; insertion over capacity evicts the
/// least-recently-used quarter of entries (`spec.md` §9's
/// evict-oldest-on-overflow policy), not just a single slot, to avoid
/// thrashing at the boundary under steady load.
pub struct Cache<K, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().unwrap();
        let expired = match guard.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            guard.pop(key);
            return None;
        }
        guard.get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() >= self.capacity {
            let evict_count = (self.capacity / 4).max(1);
            for _ in 0..evict_count {
                if guard.pop_lru().is_none() {
                    break;
                }
            }
        }
        guard.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.lock().unwrap().pop(key);
    }

    /// Drops every entry whose key matches `predicate` — used to
    /// invalidate all response-cache entries for a repo after reindexing
    /// (`spec.md` §5: "a reindex must invalidate stale cached answers").
    pub fn invalidate_matching(&self, predicate: impl Fn(&K) -> bool) {
        let mut guard = self.inner.lock().unwrap();
        let stale: Vec<K> = guard
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            guard.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let cache: Cache<String, String> = Cache::new(10, Duration::from_secs(60));
        cache.put("key".to_string(), "value".to_string());
        assert_eq!(cache.get(&"key".to_string()), Some("value".to_string()));
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_evicted() {
        let cache: Cache<String, String> = Cache::new(10, Duration::from_millis(1));
        cache.put("key".to_string(), "value".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"key".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_a_key() {
        let cache: Cache<String, String> = Cache::new(10, Duration::from_secs(60));
        cache.put("key".to_string(), "value".to_string());
        cache.invalidate(&"key".to_string());
        assert_eq!(cache.get(&"key".to_string()), None);
    }

    #[test]
    fn invalidate_matching_drops_keys_by_predicate() {
        let cache: Cache<String, String> = Cache::new(10, Duration::from_secs(60));
        cache.put("repo1|q1".to_string(), "a".to_string());
        cache.put("repo1|q2".to_string(), "b".to_string());
        cache.put("repo2|q1".to_string(), "c".to_string());
        cache.invalidate_matching(|k| k.starts_with("repo1|"));
        assert_eq!(cache.get(&"repo1|q1".to_string()), None);
        assert_eq!(cache.get(&"repo1|q2".to_string()), None);
        assert_eq!(cache.get(&"repo2|q1".to_string()), Some("c".to_string()));
    }

    #[test]
    fn overflow_evicts_a_quarter_not_just_one() {
        let cache: Cache<u32, u32> = Cache::new(4, Duration::from_secs(60));
        for i in 0..4 {
            cache.put(i, i);
        }
        cache.put(4, 4);
        assert!(cache.len() <= 4);
    }
}
