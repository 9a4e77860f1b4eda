//! The versioned `TagCache` — spec section 4.3 / 9.
//!
//! Invalidation is an integer increment (`tagver:{tag}`), never a `DEL` of
//! value keys: old entries simply age out once their TTL elapses after
//! becoming unreachable under the bumped version.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::kv::KvStore;

/// Default TTL applied when a caller does not specify one.
const DEFAULT_TTL_SECONDS: u64 = 86_400;

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical JSON serialization: `serde_json`'s default map representation
/// is a `BTreeMap` (sorted by key) unless the `preserve_order` feature is
/// enabled, which we do not enable — so `to_string` already produces a
/// deterministic, key-sorted encoding suitable for hashing.
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Deterministic ±10% TTL jitter keyed by the cache key, so concurrent
/// writers of the same key agree on the same jittered TTL and stampedes
/// are spread rather than synchronized.
fn jitter_ttl(ttl_seconds: u64, cache_key: &str) -> u64 {
    let digest = sha1_hex(cache_key.as_bytes());
    let seed = u32::from_str_radix(&digest[..8], 16).unwrap_or(0);
    let pct = (seed % 21) as i64 - 10; // -10..=10
    let delta = (ttl_seconds as i64 * pct) / 100;
    (ttl_seconds as i64 + delta).max(1) as u64
}

/// The versioned tag cache.
pub struct TagCache<K: KvStore> {
    kv: Arc<K>,
}

impl<K: KvStore> TagCache<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    async fn current_version(&self, tag: &str) -> Result<u64> {
        match self.kv.get(&format!("tagver:{tag}")).await? {
            Some(raw) => Ok(raw.parse().unwrap_or(1)),
            None => Ok(1),
        }
    }

    fn cache_key(tag: &str, version: u64, key_fields: &Value) -> String {
        let canonical = canonical_json(key_fields);
        let digest = sha1_hex(canonical.as_bytes());
        format!("{tag}:v{version}:{}", &digest[..12])
    }

    /// `get_or_set` — spec section 4.3. On a cache hit, sets `cache_hit:
    /// true` on an object-shaped value before returning it; on a miss,
    /// invokes `loader`, tags the result `cache_hit: false`, and writes it
    /// back under a jittered TTL.
    pub async fn get_or_set<F, Fut>(
        &self,
        tag: &str,
        key_fields: &Value,
        loader: F,
        ttl: Option<Duration>,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let version = self.current_version(tag).await?;
        let cache_key = Self::cache_key(tag, version, key_fields);

        if let Some(raw) = self.kv.get(&cache_key).await? {
            let mut value: Value = serde_json::from_str(&raw)
                .map_err(|e| Error::Internal(format!("corrupt cache entry {cache_key}: {e}")))?;
            if let Value::Object(map) = &mut value {
                map.insert("cache_hit".to_string(), Value::Bool(true));
            }
            return Ok(value);
        }

        let mut value = loader().await?;
        if let Value::Object(map) = &mut value {
            map.insert("cache_hit".to_string(), Value::Bool(false));
        }

        let serialized = serde_json::to_string(&value)
            .map_err(|e| Error::Internal(format!("failed to serialize cache entry: {e}")))?;
        let base_ttl = ttl.map_or(DEFAULT_TTL_SECONDS, |d| d.as_secs());
        let jittered = jitter_ttl(base_ttl, &cache_key);
        self.kv.setex(&cache_key, &serialized, jittered).await?;

        Ok(value)
    }

    /// Bump the tag version; returns the new version. No key is deleted.
    pub async fn invalidate(&self, tag: &str) -> Result<u64> {
        let new_version = self.kv.incr(&format!("tagver:{tag}")).await?;
        Ok(new_version.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::CasOutcome;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemKv {
        data: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KvStore for MemKv {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.data.lock().get(key).cloned())
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.data.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn setex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<()> {
            self.set(key, value).await
        }
        async fn incr(&self, key: &str) -> Result<i64> {
            let mut data = self.data.lock();
            let next = data
                .get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            data.insert(key.to_string(), next.to_string());
            Ok(next)
        }
        async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<()> {
            Ok(())
        }
        async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
            let full = format!("{key}::{member}");
            let mut data = self.data.lock();
            if data.contains_key(&full) {
                Ok(false)
            } else {
                data.insert(full, "1".to_string());
                Ok(true)
            }
        }
        async fn scard(&self, key: &str) -> Result<i64> {
            let prefix = format!("{key}::");
            Ok(self.data.lock().keys().filter(|k| k.starts_with(&prefix)).count() as i64)
        }
        async fn del(&self, key: &str) -> Result<()> {
            self.data.lock().remove(key);
            Ok(())
        }
        async fn merge_atomic(
            &self,
            key: &str,
            _ttl_seconds: u64,
            merge: Box<dyn FnOnce(Option<String>) -> String + Send>,
        ) -> Result<CasOutcome> {
            let mut data = self.data.lock();
            let existing = data.get(key).cloned();
            let had_existing = existing.is_some();
            let merged = merge(existing);
            data.insert(key.to_string(), merged);
            Ok(if had_existing {
                CasOutcome::Merged
            } else {
                CasOutcome::Created
            })
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let kv = Arc::new(MemKv::default());
        let cache = TagCache::new(kv);
        let key_fields = serde_json::json!({"file_hash": "A"});
        let mut calls = 0;

        let v1 = cache
            .get_or_set(
                "grades",
                &key_fields,
                || async { Ok(serde_json::json!({"mean_gpa": 3.2})) },
                None,
            )
            .await
            .unwrap();
        assert_eq!(v1["cache_hit"], false);
        calls += 1;

        let v2 = cache
            .get_or_set(
                "grades",
                &key_fields,
                || async {
                    panic!("loader should not run on a cache hit");
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(v2["cache_hit"], true);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn invalidate_bumps_version_and_misses_again() {
        let kv = Arc::new(MemKv::default());
        let cache = TagCache::new(kv);
        let key_fields = serde_json::json!({"file_hash": "A"});

        cache
            .get_or_set("grades", &key_fields, || async { Ok(serde_json::json!({"n": 1})) }, None)
            .await
            .unwrap();

        let new_version = cache.invalidate("grades").await.unwrap();
        assert_eq!(new_version, 2);

        let mut loader_ran = false;
        let result = cache
            .get_or_set(
                "grades",
                &key_fields,
                || async {
                    Ok(serde_json::json!({"n": 2}))
                },
                None,
            )
            .await
            .unwrap();
        loader_ran = true;
        assert_eq!(result["n"], 2);
        assert!(loader_ran);
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let a = jitter_ttl(1000, "grades:v1:abc");
        let b = jitter_ttl(1000, "grades:v1:abc");
        assert_eq!(a, b);
        assert!(a >= 900 && a <= 1100);
    }
}
