//! `ProfessorContext` — spec section 4.2. Up to 3 course codes; falls back
//! to a deterministic mock derived from `SHA-256(course_code)` when the
//! upstream scraper is unavailable or absent.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::error::Result;
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;

const MAX_COURSES: usize = 3;
const PROFESSORS_TTL_SECONDS: u64 = 7 * 24 * 3600;
const TAG_BIGRAM_POOL: &[&str] = &[
    "clear lectures", "tough exams", "fair grading", "heavy workload", "responsive email",
    "engaging lectures", "lenient grading", "group projects", "pop quizzes", "great feedback",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfessorInfo {
    pub overall_rating: f32,
    pub difficulty: f32,
    pub would_take_again: f32,
    pub tag_bigrams: Vec<String>,
    pub professor_name: String,
    pub review_count: u32,
    pub selection_reason: String,
}

#[async_trait]
pub trait ProfessorScraper: Send + Sync {
    async fn fetch(&self, course_code: &str) -> Result<ProfessorInfo>;
}

fn sha256_bytes(course_code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(course_code.as_bytes());
    hasher.finalize().into()
}

/// Deterministic mock derived from `SHA-256(course_code)`: stable across
/// calls within a run, varying only with the input course code.
#[must_use]
pub fn deterministic_mock(course_code: &str) -> ProfessorInfo {
    let digest = sha256_bytes(course_code);
    let byte = |i: usize| f32::from(digest[i]);

    let overall_rating = 2.5 + (byte(0) / 255.0) * 2.5;
    let difficulty = 1.0 + (byte(1) / 255.0) * 4.0;
    let would_take_again = byte(2) / 255.0;
    let review_count = 20 + (digest[3] as u32 % 180);

    let mut tag_bigrams = Vec::new();
    for i in 0..4 {
        let idx = digest[4 + i] as usize % TAG_BIGRAM_POOL.len();
        let tag = TAG_BIGRAM_POOL[idx].to_string();
        if !tag_bigrams.contains(&tag) {
            tag_bigrams.push(tag);
        }
    }

    let name_suffix = hex::encode(&digest[8..11]);
    ProfessorInfo {
        overall_rating,
        difficulty,
        would_take_again,
        tag_bigrams,
        professor_name: format!("Professor {name_suffix}"),
        review_count,
        selection_reason: "deterministic fallback: upstream review scraper unavailable".to_string(),
    }
}

pub struct ProfessorContext<K: KvStore> {
    scraper: Option<Arc<dyn ProfessorScraper>>,
    cache: TagCache<K>,
}

async fn lookup(scraper: Option<&Arc<dyn ProfessorScraper>>, course_code: &str) -> ProfessorInfo {
    match scraper {
        Some(scraper) => match scraper.fetch(course_code).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "professor scraper failed, using deterministic mock");
                deterministic_mock(course_code)
            }
        },
        None => deterministic_mock(course_code),
    }
}

impl<K: KvStore> ProfessorContext<K> {
    #[must_use]
    pub fn new(scraper: Option<Arc<dyn ProfessorScraper>>, kv: Arc<K>) -> Self {
        Self { scraper, cache: TagCache::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for ProfessorContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::ProfessorIntel
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, MAX_COURSES);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, MAX_COURSES);
        }
        if codes.is_empty() {
            return None;
        }

        let key_fields = json!({ "course_codes": &codes });
        let codes_owned = codes.clone();
        let scraper = self.scraper.clone();
        let result = self
            .cache
            .get_or_set(
                "professors",
                &key_fields,
                move || async move {
                    let mut professors = Vec::with_capacity(codes_owned.len());
                    for code in &codes_owned {
                        professors.push(lookup(scraper.as_ref(), code).await);
                    }
                    Ok(json!({ "professors": codes_owned.iter().zip(professors).collect::<Vec<_>>() }))
                },
                Some(Duration::from_secs(PROFESSORS_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                Some(ProviderOutput { kind: self.kind(), data, confidence: 0.75, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, "professor context: lookup failed");
                None
            }
        }
    }
}
