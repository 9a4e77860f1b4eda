//! `DegreeProgressEvaluator` — wraps the pure evaluation in `evaluate.rs`
//! with the versioned requirement-spec cache (spec section 4.6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::Result;
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{RequirementSpec, UnmetReq};
use serde_json::json;
use sha1::{Digest, Sha1};

use crate::evaluate::evaluate;
use crate::source::RequirementSpecSource;

const SPEC_CACHE_TTL_SECONDS: u64 = 12 * 3600;

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct DegreeProgressEvaluator<K: KvStore> {
    source: Arc<dyn RequirementSpecSource>,
    cache: TagCache<K>,
}

impl<K: KvStore> DegreeProgressEvaluator<K> {
    #[must_use]
    pub fn new(source: Arc<dyn RequirementSpecSource>, kv: Arc<K>) -> Self {
        Self { source, cache: TagCache::new(kv) }
    }

    /// Cached lookup, keyed on student id / major / sorted-completed-hash.
    pub async fn unmet_requirements(&self, student_id: &str, major: &str, have: &[String]) -> Result<Vec<UnmetReq>> {
        let mut sorted_have: Vec<String> = have.to_vec();
        sorted_have.sort();
        let have_hash = &sha1_hex(sorted_have.join(",").as_bytes())[..12];

        let key_fields = json!({ "sid": student_id, "major": major, "h": have_hash });
        let source = self.source.clone();
        let major_owned = major.to_string();
        let value = self
            .cache
            .get_or_set(
                "degree_reqs",
                &key_fields,
                move || async move {
                    let specs = source.fetch_specs(&major_owned).await?;
                    Ok(serde_json::to_value(specs).unwrap_or(serde_json::Value::Null))
                },
                Some(Duration::from_secs(SPEC_CACHE_TTL_SECONDS)),
            )
            .await?;

        let specs: Vec<RequirementSpec> = serde_json::from_value(value).unwrap_or_default();
        let have_set: HashSet<String> = have.iter().cloned().collect();
        Ok(evaluate(&specs, &have_set))
    }

    /// Identical evaluation, bypassing the cache, with `planned` courses
    /// unioned into `have` — used for "what if I also take X" queries.
    pub async fn what_if(&self, major: &str, have: &[String], planned: &[String]) -> Result<Vec<UnmetReq>> {
        let specs = self.source.fetch_specs(major).await?;
        let mut have_set: HashSet<String> = have.iter().cloned().collect();
        have_set.extend(planned.iter().cloned());
        Ok(evaluate(&specs, &have_set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::error::Error;
    use advisor_core::kv::CasOutcome;
    use advisor_core::types::{RequirementKind, Satisfier};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

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
            let next = data.get(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
            data.insert(key.to_string(), next.to_string());
            Ok(next)
        }
        async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<()> {
            Ok(())
        }
        async fn sadd(&self, _key: &str, _member: &str) -> Result<bool> {
            Ok(true)
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
            Err(Error::Internal("not used in this test".to_string()))
        }
    }

    struct CountingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RequirementSpecSource for CountingSource {
        async fn fetch_specs(&self, _major: &str) -> Result<Vec<RequirementSpec>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![RequirementSpec {
                id: "core".to_string(),
                summary: "Core".to_string(),
                kind: RequirementKind::AllOfSet,
                min_count: 0,
                min_credits: 0.0,
                satisfiers: vec![Satisfier { code: "CS 1110".to_string(), credits: 4.0 }],
            }])
        }
    }

    #[tokio::test]
    async fn unmet_requirements_caches_by_student_major_and_completed_hash() {
        let kv = Arc::new(MemKv::default());
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0) });
        let evaluator = DegreeProgressEvaluator::new(source.clone(), kv);

        let first = evaluator.unmet_requirements("sid1", "CS_BA", &[]).await.unwrap();
        let second = evaluator.unmet_requirements("sid1", "CS_BA", &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let third = evaluator.unmet_requirements("sid1", "CS_BA", &["CS 1110".to_string()]).await.unwrap();
        assert!(third.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn what_if_bypasses_cache_and_unions_planned() {
        let kv = Arc::new(MemKv::default());
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0) });
        let evaluator = DegreeProgressEvaluator::new(source.clone(), kv);

        let result = evaluator.what_if("CS_BA", &[], &["CS 1110".to_string()]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
