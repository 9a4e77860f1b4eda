//! `ScheduleFitService::rank_schedules` — spec section 4.5. Fetches and
//! caches per-course `SectionBundle` lists, then runs the beam search and
//! ranks/dedupes the result.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::Result;
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::SectionBundle;
use serde_json::json;

use crate::beam::{search, RankedSchedule, SchedulePrefs};
use crate::roster::RosterFetcher;

const SECTION_BUNDLES_TTL_SECONDS: u64 = 30 * 24 * 3600;

pub struct ScheduleFitConfig {
    pub beam_width: usize,
    pub node_limit: usize,
    pub timeout: Duration,
}

impl Default for ScheduleFitConfig {
    fn default() -> Self {
        Self { beam_width: 1024, node_limit: 50_000, timeout: Duration::from_millis(300) }
    }
}

pub struct ScheduleFitService<K: KvStore> {
    roster: Arc<dyn RosterFetcher>,
    cache: TagCache<K>,
    config: ScheduleFitConfig,
}

impl<K: KvStore> ScheduleFitService<K> {
    #[must_use]
    pub fn new(roster: Arc<dyn RosterFetcher>, kv: Arc<K>, config: ScheduleFitConfig) -> Self {
        Self { roster, cache: TagCache::new(kv), config }
    }

    /// Cached per-course section bundle lookup, also used to assemble
    /// calendar exports outside the beam search.
    pub async fn bundles_for(&self, term: &str, course_code: &str) -> Result<Vec<SectionBundle>> {
        let key_fields = json!({ "term": term, "course_code": course_code });
        let roster = self.roster.clone();
        let term_owned = term.to_string();
        let code_owned = course_code.to_string();
        let value = self
            .cache
            .get_or_set(
                "section_bundles",
                &key_fields,
                move || async move {
                    let bundles = roster.fetch_bundles(&term_owned, &code_owned).await?;
                    Ok(serde_json::to_value(bundles).unwrap_or(serde_json::Value::Null))
                },
                Some(Duration::from_secs(SECTION_BUNDLES_TTL_SECONDS)),
            )
            .await?;

        let bundles: Vec<SectionBundle> = serde_json::from_value(value).unwrap_or_default();
        Ok(bundles)
    }

    /// Least-branching-first ordering, beam search, then rank/dedupe/
    /// truncate to `limit`.
    pub async fn rank_schedules(
        &self,
        term: &str,
        course_codes: &[String],
        prefs: SchedulePrefs,
        limit: usize,
    ) -> Result<Vec<RankedSchedule>> {
        let mut courses = Vec::with_capacity(course_codes.len());
        for code in course_codes {
            let bundles = self.bundles_for(term, code).await?;
            courses.push((code.clone(), bundles));
        }

        courses.sort_by_key(|(_, bundles)| bundles.len());

        let mut results = search(&courses, prefs, self.config.beam_width, self.config.node_limit, self.config.timeout);

        let has_conflict_free = results.iter().any(|r| r.conflict_reason.is_none());
        if has_conflict_free {
            results.retain(|r| r.conflict_reason.is_none());
        }

        results.sort_by(|a, b| {
            b.fit_score
                .cmp(&a.fit_score)
                .then(a.total_gaps.cmp(&b.total_gaps))
                .then(a.earliest_start.cmp(&b.earliest_start))
                .then(a.bundle_ids.cmp(&b.bundle_ids))
        });
        results.dedup_by(|a, b| a.bundle_ids == b.bundle_ids);
        results.truncate(limit);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::error::Error;
    use advisor_core::kv::CasOutcome;
    use advisor_core::types::SectionMeeting;
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

    struct FakeRoster;

    #[async_trait]
    impl RosterFetcher for FakeRoster {
        async fn fetch_bundles(&self, _term: &str, course_code: &str) -> Result<Vec<SectionBundle>> {
            Ok(vec![SectionBundle {
                bundle_id: format!("{course_code}-1"),
                course_code: course_code.to_string(),
                meetings: vec![SectionMeeting { days: vec!['M'], start_min: 600, end_min: 660 }],
            }])
        }
    }

    #[tokio::test]
    async fn rank_schedules_caches_bundle_lookups() {
        let kv = Arc::new(MemKv::default());
        let service = ScheduleFitService::new(Arc::new(FakeRoster), kv, ScheduleFitConfig::default());
        let codes = vec!["CS 1110".to_string()];
        let first = service.rank_schedules("FA25", &codes, SchedulePrefs::default(), 5).await.unwrap();
        let second = service.rank_schedules("FA25", &codes, SchedulePrefs::default(), 5).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].fit_score, 100);
    }
}
