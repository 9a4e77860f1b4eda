//! Embedding client — obtains a dense vector for a chat message from an
//! OpenAI-compatible embeddings endpoint, cached under the literal key
//! format `embedding:v1:sha1(message)[0:16]` for 7 days (spec section 4.2;
//! deliberately not routed through `TagCache`'s bumpable-version scheme,
//! since an embedding for a given text never needs invalidation).

use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::{Error, Result};
use advisor_core::kv::KvStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

const EMBEDDING_TTL_SECONDS: u64 = 7 * 24 * 3600;
const MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponseItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseItem>,
}

fn cache_key(message: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(message.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("embedding:v1:{}", &digest[..16])
}

/// Calls an OpenAI-compatible `/embeddings` endpoint and caches results in
/// the shared KV store.
pub struct EmbeddingClient<K: KvStore> {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    kv: Arc<K>,
}

impl<K: KvStore> EmbeddingClient<K> {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, kv: Arc<K>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key,
            kv,
        }
    }

    /// Embed `message`, serving a cached vector when present.
    pub async fn embed(&self, message: &str) -> Result<Vec<f32>> {
        let key = cache_key(message);
        if let Some(raw) = self.kv.get(&key).await? {
            if let Ok(vector) = serde_json::from_str::<Vec<f32>>(&raw) {
                return Ok(vector);
            }
        }

        let vector = self.embed_uncached(message).await?;
        if let Ok(serialized) = serde_json::to_string(&vector) {
            let _ = self.kv.setex(&key, &serialized, EMBEDDING_TTL_SECONDS).await;
        }
        Ok(vector)
    }

    async fn embed_uncached(&self, message: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(&EmbeddingRequest { model: MODEL, input: message });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                service: "embedding_api".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable {
                service: "embedding_api".to_string(),
                detail: format!("status {}", response.status()),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| Error::UpstreamUnavailable {
            service: "embedding_api".to_string(),
            detail: e.to_string(),
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| Error::UpstreamUnavailable {
                service: "embedding_api".to_string(),
                detail: "empty embeddings response".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic_and_16_hex_chars() {
        let a = cache_key("I've completed CS 1110");
        let b = cache_key("I've completed CS 1110");
        assert_eq!(a, b);
        assert_eq!(a.len(), "embedding:v1:".len() + 16);
    }

    #[test]
    fn cache_key_differs_by_message() {
        assert_ne!(cache_key("a"), cache_key("b"));
    }
}
