//! `ProvenanceStore` — spec section 4.4.

use std::sync::Arc;

use chrono::Utc;
use prometheus::IntGaugeVec;

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::types::ProvenanceTag;

const INDEX_TTL_SECONDS: u64 = 60 * 24 * 3600;

/// Bounded-cardinality reason labels for invalidation metrics; anything
/// else collapses to `"other"` so label cardinality never grows with
/// arbitrary source/entity values.
fn invalidation_reason_label(version_changed: bool, data_version_changed: bool) -> &'static str {
    match (version_changed, data_version_changed) {
        (true, true) => "version_and_data_changed",
        (true, false) => "version_changed",
        (false, true) => "data_changed",
        (false, false) => "other",
    }
}

/// Records `(source, entity_id) -> ProvenanceTag` and the staleness rules
/// downstream callers apply to it.
pub struct ProvenanceStore<K: KvStore> {
    kv: Arc<K>,
    index_gauge: Option<IntGaugeVec>,
}

impl<K: KvStore> ProvenanceStore<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            index_gauge: None,
        }
    }

    #[must_use]
    pub fn with_index_gauge(mut self, gauge: IntGaugeVec) -> Self {
        self.index_gauge = Some(gauge);
        self
    }

    fn tag_key(source: &str, entity_id: &str) -> String {
        format!("prov:{source}:{entity_id}")
    }

    fn index_key(source: &str) -> String {
        let month = Utc::now().format("%Y%m");
        format!("prov:index:{source}:{month}")
    }

    /// Write a provenance tag and record it in the month-bucketed source
    /// index; the index-size gauge only increments when the entity id was
    /// not already a member.
    pub async fn put(&self, tag: &ProvenanceTag) -> Result<()> {
        let serialized = serde_json::to_string(tag)
            .map_err(|e| Error::Internal(format!("failed to serialize provenance tag: {e}")))?;
        let ttl = tag.ttl_seconds.max(1);
        self.kv
            .setex(&Self::tag_key(&tag.source, &tag.entity_id), &serialized, ttl)
            .await?;

        let index_key = Self::index_key(&tag.source);
        let inserted = self.kv.sadd(&index_key, &tag.entity_id).await?;
        self.kv.expire(&index_key, INDEX_TTL_SECONDS).await?;
        if inserted {
            if let Some(gauge) = &self.index_gauge {
                gauge.with_label_values(&[&tag.source]).inc();
            }
        }
        Ok(())
    }

    /// Load a provenance tag, if present.
    pub async fn get(&self, source: &str, entity_id: &str) -> Result<Option<ProvenanceTag>> {
        match self.kv.get(&Self::tag_key(source, entity_id)).await? {
            Some(raw) => {
                let tag = serde_json::from_str(&raw)
                    .map_err(|e| Error::Internal(format!("corrupt provenance tag: {e}")))?;
                Ok(Some(tag))
            }
            None => Ok(None),
        }
    }

    /// Hard stale: tag missing, or `now >= expires_at`.
    #[must_use]
    pub fn is_hard_stale(tag: Option<&ProvenanceTag>) -> bool {
        match tag {
            None => true,
            Some(t) => t.is_hard_stale(Utc::now()),
        }
    }

    /// Soft stale: served but should trigger a background refresh.
    #[must_use]
    pub fn is_soft_stale(tag: &ProvenanceTag) -> bool {
        tag.is_soft_stale(Utc::now())
    }

    /// Delete the tag and invoke the optional drop-cache callback when the
    /// caller's observed version or data version differs from the stored
    /// tag's. No-op (besides the reason label) when both match.
    pub async fn invalidate_on_version_change<F>(
        &self,
        source: &str,
        entity_id: &str,
        current_version: Option<&str>,
        current_data_version: Option<&str>,
        drop_cache_fn: Option<F>,
    ) -> Result<bool>
    where
        F: FnOnce(&str, &str),
    {
        let existing = self.get(source, entity_id).await?;
        let Some(existing) = existing else {
            return Ok(false);
        };

        let version_changed = existing.version.as_deref() != current_version;
        let data_version_changed = existing.data_version.as_deref() != current_data_version;

        if !version_changed && !data_version_changed {
            return Ok(false);
        }

        let _reason = invalidation_reason_label(version_changed, data_version_changed);
        self.kv.del(&Self::tag_key(source, entity_id)).await?;
        if let Some(f) = drop_cache_fn {
            f(source, entity_id);
        }
        Ok(true)
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
        async fn incr(&self, _key: &str) -> Result<i64> {
            Ok(1)
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
                data.insert(full, "1".into());
                Ok(true)
            }
        }
        async fn scard(&self, _key: &str) -> Result<i64> {
            Ok(0)
        }
        async fn del(&self, key: &str) -> Result<()> {
            self.data.lock().remove(key);
            Ok(())
        }
        async fn merge_atomic(
            &self,
            _key: &str,
            _ttl_seconds: u64,
            _merge: Box<dyn FnOnce(Option<String>) -> String + Send>,
        ) -> Result<CasOutcome> {
            Ok(CasOutcome::Created)
        }
    }

    fn sample_tag(version: &str, data_version: &str) -> ProvenanceTag {
        ProvenanceTag {
            source: "grades".into(),
            entity_id: "CS 1110".into(),
            tenant: None,
            version: Some(version.to_string()),
            data_version: Some(data_version.to_string()),
            observed_at: None,
            fetched_at: Utc::now(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            ttl_seconds: 86400,
            soft_ttl_seconds: None,
            meta: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = ProvenanceStore::new(Arc::new(MemKv::default()));
        let tag = sample_tag("v1", "d1");
        store.put(&tag).await.unwrap();
        let loaded = store.get("grades", "CS 1110").await.unwrap().unwrap();
        assert_eq!(loaded.version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn hard_stale_when_missing_or_expired() {
        assert!(ProvenanceStore::<MemKv>::is_hard_stale(None));
        let tag = sample_tag("v1", "d1");
        assert!(ProvenanceStore::<MemKv>::is_hard_stale(Some(&tag)));
    }

    #[tokio::test]
    async fn invalidate_on_version_change_fires_callback() {
        let store = ProvenanceStore::new(Arc::new(MemKv::default()));
        let tag = sample_tag("v1", "d1");
        store.put(&tag).await.unwrap();

        let mut called = false;
        let changed = store
            .invalidate_on_version_change(
                "grades",
                "CS 1110",
                Some("v2"),
                Some("d1"),
                Some(|_s: &str, _e: &str| {
                    called = true;
                }),
            )
            .await
            .unwrap();
        assert!(changed);
        assert!(store.get("grades", "CS 1110").await.unwrap().is_none());
        let _ = called;
    }

    #[tokio::test]
    async fn invalidate_on_version_change_noop_when_same() {
        let store = ProvenanceStore::new(Arc::new(MemKv::default()));
        let tag = sample_tag("v1", "d1");
        store.put(&tag).await.unwrap();

        let changed = store
            .invalidate_on_version_change::<fn(&str, &str)>(
                "grades",
                "CS 1110",
                Some("v1"),
                Some("d1"),
                None,
            )
            .await
            .unwrap();
        assert!(!changed);
        assert!(store.get("grades", "CS 1110").await.unwrap().is_some());
    }
}
