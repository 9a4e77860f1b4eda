//! `ConflictDetectionContext` — spec section 4.2. Pairwise time-overlap
//! analysis over a mentioned course set, reusing the same cached bundle
//! lookup tag as the schedule-fit beam search.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::token_budget::clamp_to_tokens;
use advisor_core::types::{ContextKind, SectionBundle, StudentProfile};
use advisor_core::ContextProvider;
use advisor_schedule::RosterFetcher;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

const MAX_COURSES: usize = 5;
const BUNDLES_TTL_SECONDS: u64 = 30 * 24 * 3600;
const SUMMARY_TOKEN_BUDGET: u32 = 200;

pub struct ConflictDetectionContext<K: KvStore> {
    roster: Arc<dyn RosterFetcher>,
    cache: TagCache<K>,
    term: String,
}

impl<K: KvStore> ConflictDetectionContext<K> {
    #[must_use]
    pub fn new(roster: Arc<dyn RosterFetcher>, kv: Arc<K>, term: String) -> Self {
        Self { roster, cache: TagCache::new(kv), term }
    }

    async fn bundles_for(&self, course_code: &str) -> Option<Vec<SectionBundle>> {
        let key_fields = json!({ "term": &self.term, "course_code": course_code });
        let roster = Arc::clone(&self.roster);
        let term_owned = self.term.clone();
        let code_owned = course_code.to_string();
        let result = self
            .cache
            .get_or_set(
                "section_bundles",
                &key_fields,
                move || async move {
                    let bundles = roster.fetch_bundles(&term_owned, &code_owned).await?;
                    Ok(serde_json::to_value(bundles).unwrap_or(serde_json::Value::Null))
                },
                Some(Duration::from_secs(BUNDLES_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "conflict detection: bundle fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for ConflictDetectionContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::ConflictDetection
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, MAX_COURSES);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, MAX_COURSES);
        }
        if codes.len() < 2 {
            return None;
        }

        let mut per_course = Vec::new();
        for code in &codes {
            let bundles = self.bundles_for(code).await.unwrap_or_default();
            per_course.push((code.clone(), bundles));
        }

        let mut conflicts = Vec::new();
        let mut backup_plans = Vec::new();

        for i in 0..per_course.len() {
            for j in (i + 1)..per_course.len() {
                let (code_a, bundles_a) = &per_course[i];
                let (code_b, bundles_b) = &per_course[j];
                if bundles_a.is_empty() || bundles_b.is_empty() {
                    continue;
                }

                let mut any_free = None;
                let mut all_conflict = true;
                for ba in bundles_a {
                    for bb in bundles_b {
                        let conflicts_pair =
                            ba.meetings.iter().any(|ma| bb.meetings.iter().any(|mb| ma.conflicts_with(mb)));
                        if conflicts_pair {
                            continue;
                        }
                        all_conflict = false;
                        if any_free.is_none() {
                            any_free = Some((ba.bundle_id.clone(), bb.bundle_id.clone()));
                        }
                    }
                }

                if all_conflict {
                    conflicts.push(json!({ "course_a": code_a, "course_b": code_b, "reason": format!("{code_a}×{code_b}") }));
                } else if let Some((free_a, free_b)) = any_free {
                    backup_plans.push(json!({
                        "course_a": code_a, "course_b": code_b,
                        "bundle_a": free_a, "bundle_b": free_b,
                    }));
                }
            }
        }

        let summary_text = if conflicts.is_empty() {
            "No unavoidable time conflicts found among the mentioned courses.".to_string()
        } else {
            let reasons: Vec<String> =
                conflicts.iter().filter_map(|c| c.get("reason").and_then(|r| r.as_str()).map(str::to_string)).collect();
            clamp_to_tokens(&format!("Conflicts found: {}.", reasons.join(", ")), SUMMARY_TOKEN_BUDGET)
        };

        Some(ProviderOutput {
            kind: self.kind(),
            data: json!({ "conflicts": conflicts, "backup_plans": backup_plans, "summary_text": summary_text }),
            confidence: 0.85,
            version: 1,
            cache_hit: false,
        })
    }
}
