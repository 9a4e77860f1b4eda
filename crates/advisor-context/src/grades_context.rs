//! `GradesContext` — spec section 4.2. Wraps `GradesCatalog` with the
//! versioned cache (keyed with the source file's hash) and a provenance
//! write.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::provenance::ProvenanceStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::grades::GradesCatalog;

const GRADES_TTL_SECONDS: u64 = 24 * 3600;

pub struct GradesContext<K: KvStore> {
    catalog: Arc<GradesCatalog>,
    cache: TagCache<K>,
    provenance: ProvenanceStore<K>,
}

impl<K: KvStore> GradesContext<K> {
    #[must_use]
    pub fn new(catalog: Arc<GradesCatalog>, kv: Arc<K>) -> Self {
        Self { catalog, cache: TagCache::new(Arc::clone(&kv)), provenance: ProvenanceStore::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for GradesContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::GradesData
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, 3);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, 3);
        }
        let course_code = codes.into_iter().next()?;

        let key_fields = json!({ "course_code": &course_code, "file_hash": &self.catalog.file_hash });
        let catalog = Arc::clone(&self.catalog);
        let code_owned = course_code.clone();
        let result = self
            .cache
            .get_or_set(
                "grades",
                &key_fields,
                move || async move {
                    match catalog.aggregate(&code_owned) {
                        Some(stats) => Ok(serde_json::to_value(stats).unwrap_or(serde_json::Value::Null)),
                        None => Ok(serde_json::Value::Null),
                    }
                },
                Some(Duration::from_secs(GRADES_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(serde_json::Value::Null) => None,
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                if let Ok(stats) = serde_json::from_value::<advisor_core::types::CourseGradesStats>(data.clone()) {
                    if let Err(e) = self.provenance.put(&stats.provenance).await {
                        warn!(error = %e, "grades context: failed to write provenance tag");
                    }
                }
                Some(ProviderOutput { kind: self.kind(), data, confidence: 0.95, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "grades context: lookup failed");
                None
            }
        }
    }
}
