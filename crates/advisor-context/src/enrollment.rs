//! `EnrollmentContext` — spec section 4.2. Heuristic capacity/waitlist
//! estimate derived from subject, course level, and a deterministic hash of
//! the course code (stands in for a real registrar feed).

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use async_trait::async_trait;
use serde_json::json;
use sha1::{Digest, Sha1};
use tracing::warn;

const ENROLLMENT_TTL_SECONDS: u64 = 3600;

fn course_level(course_code: &str) -> u32 {
    course_code.chars().filter(char::is_ascii_digit).take(1).collect::<String>().parse().unwrap_or(3)
}

fn risk_level(waitlist_prob: f32) -> &'static str {
    match waitlist_prob {
        p if p < 0.25 => "low",
        p if p < 0.5 => "moderate",
        p if p < 0.75 => "high",
        _ => "very_high",
    }
}

fn heuristic_enrollment(course_code: &str) -> serde_json::Value {
    let mut hasher = Sha1::new();
    hasher.update(course_code.as_bytes());
    let digest = hasher.finalize();

    let level = course_level(course_code);
    let base_capacity = 300u32.saturating_sub(level * 40).max(20);
    let capacity = base_capacity + u32::from(digest[0]) % 40;

    let historical_fill_hours = 2.0 + f32::from(digest[1]) / 255.0 * 70.0;
    let waitlist_prob = (f32::from(digest[2]) / 255.0 * 0.6 + (level as f32 / 9.0) * 0.4).clamp(0.0, 1.0);
    let risk = risk_level(waitlist_prob);
    let advice = match risk {
        "low" => "Enroll whenever convenient; seats are plentiful.",
        "moderate" => "Register during your first enrollment window to avoid the waitlist.",
        "high" => "Register the moment your window opens; this section fills quickly.",
        _ => "Expect a waitlist; have a backup section or course ready.",
    };

    json!({
        "capacity": capacity,
        "historical_fill_hours": historical_fill_hours,
        "waitlist_prob": waitlist_prob,
        "risk_level": risk,
        "advice": advice,
    })
}

pub struct EnrollmentContext<K: KvStore> {
    cache: TagCache<K>,
}

impl<K: KvStore> EnrollmentContext<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self { cache: TagCache::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for EnrollmentContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::EnrollmentData
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, 3);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, 3);
        }
        let course_code = codes.into_iter().next()?;

        let key_fields = json!({ "course_code": &course_code });
        let code_owned = course_code.clone();
        let result = self
            .cache
            .get_or_set(
                "enrollment",
                &key_fields,
                move || async move { Ok(heuristic_enrollment(&code_owned)) },
                Some(Duration::from_secs(ENROLLMENT_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                Some(ProviderOutput { kind: self.kind(), data, confidence: 0.6, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "enrollment context: lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_buckets_are_monotonic() {
        assert_eq!(risk_level(0.1), "low");
        assert_eq!(risk_level(0.3), "moderate");
        assert_eq!(risk_level(0.6), "high");
        assert_eq!(risk_level(0.9), "very_high");
    }
}
