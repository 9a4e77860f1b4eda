//! `GraphContext` — spec section 4.2. Prerequisite paths for the first
//! course code mentioned (or the profile fallback), cached by
//! `(course_code, sorted(completed))` under tag `graphctx`.

use std::sync::Arc;

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use advisor_graph::PathfindingService;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

const PATH_DEPTH: u32 = 3;
const PATH_LIMIT: u32 = 3;

pub struct GraphContext<K: KvStore> {
    pathfinding: Arc<PathfindingService>,
    cache: TagCache<K>,
}

impl<K: KvStore> GraphContext<K> {
    #[must_use]
    pub fn new(pathfinding: Arc<PathfindingService>, kv: Arc<K>) -> Self {
        Self { pathfinding, cache: TagCache::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for GraphContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::GraphAnalysis
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let codes = extract_course_codes(message, 1);
        let course_code = codes.into_iter().next().or_else(|| fallback_from_profile(profile, 1).into_iter().next())?;

        let mut completed = profile.completed.clone();
        completed.sort();

        let key_fields = json!({ "course_code": &course_code, "completed": &completed });
        let pathfinding = Arc::clone(&self.pathfinding);
        let code_owned = course_code.clone();
        let result = self
            .cache
            .get_or_set(
                "graphctx",
                &key_fields,
                move || async move {
                    let paths = pathfinding.prerequisite_paths(&code_owned, PATH_DEPTH, PATH_LIMIT).await?;
                    Ok(json!({ "course_code": code_owned, "paths": paths }))
                },
                None,
            )
            .await;

        match result {
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                Some(ProviderOutput { kind: self.kind(), data, confidence: 0.9, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, course_code = %course_code, "graph context: prerequisite path lookup failed");
                None
            }
        }
    }
}
