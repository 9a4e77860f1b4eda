//! Qdrant-backed vector index adapter — the `search(query_vector, top_k,
//! score_threshold, with_payload=true)` contract from spec section 6,
//! grounded on `dashflow-qdrant`'s `query_points`/`QueryPointsBuilder` usage.

use advisor_core::error::{Error, Result};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{QueryPointsBuilder, Value as QdrantValue};
use qdrant_client::Qdrant;
use serde::Serialize;

/// One scored course returned from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCourse {
    pub code: String,
    pub title: String,
    pub description: String,
    pub similarity: f32,
}

fn string_field(payload: &std::collections::HashMap<String, QdrantValue>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Thin wrapper over a `qdrant_client::Qdrant` handle scoped to one
/// collection.
pub struct VectorIndex {
    client: Qdrant,
    collection_name: String,
}

impl VectorIndex {
    pub fn connect(url: &str, collection_name: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::UpstreamUnavailable { service: "qdrant".to_string(), detail: e.to_string() })?;
        Ok(Self { client, collection_name: collection_name.into() })
    }

    /// Top-`top_k` courses by cosine similarity to `query_vector`, filtered
    /// to `score_threshold` and above.
    pub async fn search(&self, query_vector: &[f32], top_k: usize, score_threshold: f32) -> Result<Vec<SimilarCourse>> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection_name)
                    .query(query_vector.to_vec())
                    .limit(top_k as u64)
                    .with_payload(true)
                    .with_vectors(false)
                    .score_threshold(score_threshold),
            )
            .await
            .map_err(|e| Error::UpstreamUnavailable { service: "qdrant".to_string(), detail: e.to_string() })?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let payload = scored.payload;
                SimilarCourse {
                    code: string_field(&payload, "code"),
                    title: string_field(&payload, "title"),
                    description: string_field(&payload, "description"),
                    similarity: scored.score,
                }
            })
            .filter(|course| !course.code.is_empty())
            .collect();

        Ok(results)
    }

    /// Reachability probe for `/health` — does not touch the collection.
    pub async fn ping(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::Value as QdrantValue;
    use std::collections::HashMap;

    #[test]
    fn string_field_extracts_known_key() {
        let mut payload = HashMap::new();
        payload.insert(
            "code".to_string(),
            QdrantValue { kind: Some(Kind::StringValue("CS 3110".to_string())) },
        );
        assert_eq!(string_field(&payload, "code"), "CS 3110");
        assert_eq!(string_field(&payload, "missing"), "");
    }
}
