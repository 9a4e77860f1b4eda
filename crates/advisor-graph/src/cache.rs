//! Bounded LRU cache for graph algorithm results, keyed by a SHA-256 of
//! normalized/sorted query parameters. Independent of `TagCache` (which is
//! KV-backed and version-bumped); this one is per-process and TTL-expired.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// Build a deterministic cache key from already-stringified, sorted
/// parameter parts.
#[must_use]
pub fn cache_key(parts: &[String]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort();
    let joined = sorted.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}

pub struct AlgoCache<V: Clone> {
    inner: Mutex<LruCache<String, (V, Instant)>>,
    ttl: Duration,
}

impl<V: Clone> AlgoCache<V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.lock();
        let (value, inserted_at) = cache.get(key)?.clone();
        if inserted_at.elapsed() > self.ttl {
            cache.pop(key);
            return None;
        }
        Some(value)
    }

    pub fn put(&self, key: String, value: V) {
        self.inner.lock().put(key, (value, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_order_independent() {
        let a = cache_key(&["b".to_string(), "a".to_string()]);
        let b = cache_key(&["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: AlgoCache<i32> = AlgoCache::new(4, Duration::from_millis(10));
        cache.put("k".to_string(), 42);
        assert_eq!(cache.get("k"), Some(42));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }
}
