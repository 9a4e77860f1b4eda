//! `DifficultyContext` — spec section 4.2. Prefers real grade data; falls
//! back to a heuristic derived from the course's subject and level.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::grades::GradesCatalog;

const DIFFICULTY_TTL_SECONDS: u64 = 24 * 3600;

/// Heuristic difficulty (1..5) from course level: `1xxx/2xxx` easier,
/// `5xxx+`/graduate-numbered harder. Parses the first run of digits in the
/// code; defaults to mid-difficulty when no digits are present.
fn heuristic_difficulty(course_code: &str) -> (String, f32) {
    let subject = course_code.split_whitespace().next().unwrap_or("").to_string();
    let level_digits: String = course_code.chars().filter(char::is_ascii_digit).take(1).collect();
    let level = level_digits.parse::<u32>().unwrap_or(3);
    let difficulty = (1.0 + (level as f32 - 1.0) * 0.75).clamp(1.0, 5.0);
    (subject, difficulty)
}

pub struct DifficultyContext<K: KvStore> {
    catalog: Arc<GradesCatalog>,
    cache: TagCache<K>,
}

impl<K: KvStore> DifficultyContext<K> {
    #[must_use]
    pub fn new(catalog: Arc<GradesCatalog>, kv: Arc<K>) -> Self {
        Self { catalog, cache: TagCache::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for DifficultyContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::DifficultyData
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, 3);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, 3);
        }
        let course_code = codes.into_iter().next()?;

        let key_fields = json!({ "course_code": &course_code });
        let catalog = Arc::clone(&self.catalog);
        let code_owned = course_code.clone();
        let result = self
            .cache
            .get_or_set(
                "difficulty",
                &key_fields,
                move || async move {
                    if let Some(stats) = catalog.aggregate(&code_owned) {
                        return Ok(json!({
                            "course_code": code_owned,
                            "difficulty_percentile": stats.difficulty_percentile,
                            "mean_gpa": stats.mean_gpa,
                            "source": "grades",
                        }));
                    }
                    let (subject, difficulty) = heuristic_difficulty(&code_owned);
                    Ok(json!({
                        "course_code": code_owned,
                        "difficulty_percentile": difficulty * 20.0,
                        "subject": subject,
                        "source": "heuristic",
                    }))
                },
                Some(Duration::from_secs(DIFFICULTY_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                let confidence = if data.get("source").and_then(|v| v.as_str()) == Some("grades") { 0.9 } else { 0.5 };
                Some(ProviderOutput { kind: self.kind(), data, confidence, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "difficulty context: lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_course_level_yields_higher_heuristic_difficulty() {
        let (_, intro) = heuristic_difficulty("CS 1110");
        let (_, advanced) = heuristic_difficulty("CS 4820");
        assert!(advanced > intro);
    }
}
