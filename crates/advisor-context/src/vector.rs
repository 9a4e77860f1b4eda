//! `VectorContext` — spec section 4.2. Embeds the message (cached inside
//! `EmbeddingClient`) then queries the vector index for similar courses,
//! caching the search result itself under a separate tag.

use std::sync::Arc;
use std::time::Duration;

use advisor_core::context_provider::ProviderOutput;
use advisor_core::kv::KvStore;
use advisor_core::tag_cache::TagCache;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use advisor_vector::{EmbeddingClient, VectorIndex};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

const TOP_K: usize = 5;
const SCORE_THRESHOLD: f32 = 0.7;
const SEARCH_TTL_SECONDS: u64 = 3600;

pub struct VectorContext<K: KvStore> {
    embeddings: Arc<EmbeddingClient<K>>,
    index: Arc<VectorIndex>,
    cache: TagCache<K>,
}

impl<K: KvStore> VectorContext<K> {
    #[must_use]
    pub fn new(embeddings: Arc<EmbeddingClient<K>>, index: Arc<VectorIndex>, kv: Arc<K>) -> Self {
        Self { embeddings, index, cache: TagCache::new(kv) }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for VectorContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::VectorSearch
    }

    async fn fetch(&self, message: &str, _profile: &StudentProfile) -> Option<ProviderOutput> {
        let vector = match self.embeddings.embed(message).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "vector context: embedding failed");
                return None;
            }
        };

        let key_fields = json!({ "message": message, "top_k": TOP_K, "score_threshold": SCORE_THRESHOLD });
        let index = Arc::clone(&self.index);
        let vector_owned = vector.clone();
        let message_owned = message.to_string();
        let result = self
            .cache
            .get_or_set(
                "vector_search",
                &key_fields,
                move || async move {
                    let similar = index.search(&vector_owned, TOP_K, SCORE_THRESHOLD).await?;
                    Ok(json!({ "similar_courses": similar, "query": message_owned }))
                },
                Some(Duration::from_secs(SEARCH_TTL_SECONDS)),
            )
            .await;

        match result {
            Ok(data) => {
                let cache_hit = data.get("cache_hit").and_then(|v| v.as_bool()).unwrap_or(false);
                Some(ProviderOutput { kind: self.kind(), data, confidence: 0.85, version: 1, cache_hit })
            }
            Err(e) => {
                warn!(error = %e, "vector context: search failed");
                None
            }
        }
    }
}
