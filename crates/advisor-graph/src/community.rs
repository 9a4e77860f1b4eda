//! `CommunityService` — Louvain community detection over the similarity
//! graph, with modularity from `gds.louvain.stats` and a similarity-weighted
//! cohesion score, grounded on `write_communities`/`compute_cohesion` in
//! `communities.py`'s `run_complete_analysis`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::Result;
use neo4rs::Query;
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, AlgoCache};
use crate::engine::GraphEngine;
use crate::projection::{ProjectionCatalogManager, SIMILARITY_GRAPH};

const CACHE_CAPACITY: usize = 128;
const CACHE_TTL: Duration = Duration::from_secs(7200);
const COMMUNITY_PROPERTY: &str = "communityId";

#[derive(Debug, Clone, Copy)]
pub struct CommunityParams {
    pub min_community_size: u32,
    pub resolution: f32,
}

impl CommunityParams {
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            min_community_size: self.min_community_size.max(1),
            resolution: self.resolution.clamp(0.1, 10.0),
        }
    }

    fn cache_parts(&self) -> Vec<String> {
        vec![self.min_community_size.to_string(), self.resolution.to_string()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityResult {
    pub community_id: i64,
    pub members: Vec<String>,
    pub cohesion: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityMetadata {
    pub modularity: f64,
    pub num_communities: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityAnalysis {
    pub communities: Vec<CommunityResult>,
    pub metadata: CommunityMetadata,
}

pub struct CommunityService {
    engine: Arc<GraphEngine>,
    projections: Arc<ProjectionCatalogManager>,
    cache: AlgoCache<CommunityAnalysis>,
}

impl CommunityService {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>, projections: Arc<ProjectionCatalogManager>) -> Self {
        Self {
            engine,
            projections,
            cache: AlgoCache::new(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    pub async fn compute(&self, params: CommunityParams) -> Result<CommunityAnalysis> {
        let params = params.clamped();
        let key = cache_key(&params.cache_parts());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        self.projections.ensure(SIMILARITY_GRAPH).await?;

        // Larger resolution asks for finer-grained (more, smaller) communities,
        // which Louvain approximates here via a tighter convergence tolerance.
        let tolerance = (1.0_f64 / f64::from(params.resolution)).clamp(0.0001, 1.0);
        let write_query = Query::new(
            "CALL gds.louvain.write($graph, { \
                writeProperty: $writeProperty, \
                relationshipWeightProperty: 'weight', \
                tolerance: $tolerance \
             }) YIELD communityCount"
                .to_string(),
        )
        .param("graph", SIMILARITY_GRAPH)
        .param("writeProperty", COMMUNITY_PROPERTY)
        .param("tolerance", tolerance);
        self.engine.run(write_query).await?;

        let stats_query = Query::new(
            "CALL gds.louvain.stats($graph, {relationshipWeightProperty: 'weight'}) \
             YIELD modularity, communityCount \
             RETURN modularity, communityCount"
                .to_string(),
        )
        .param("graph", SIMILARITY_GRAPH);
        let stats_rows = self.engine.run(stats_query).await?;
        let modularity = stats_rows.first().and_then(|row| row.get::<f64>("modularity").ok()).unwrap_or(0.0);

        let members_query = Query::new(
            "MATCH (c:Course) WHERE c.communityId IS NOT NULL \
             WITH c.communityId AS communityId, collect(c.code) AS members \
             RETURN communityId, members"
                .to_string(),
        );
        let member_rows = self.engine.run(members_query).await?;
        let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
        for row in &member_rows {
            let Ok(community_id) = row.get::<i64>("communityId") else { continue };
            let members = row.get::<Vec<String>>("members").unwrap_or_default();
            grouped.insert(community_id, members);
        }

        let cohesion_by_community = self.cohesion().await?;

        let mut communities: Vec<CommunityResult> = grouped
            .into_iter()
            .filter(|(_, members)| members.len() as u32 >= params.min_community_size)
            .map(|(community_id, members)| CommunityResult {
                cohesion: cohesion_by_community.get(&community_id).copied().unwrap_or(0.0),
                community_id,
                members,
            })
            .collect();
        communities.sort_by(|a, b| b.cohesion.partial_cmp(&a.cohesion).unwrap_or(std::cmp::Ordering::Equal));

        let analysis = CommunityAnalysis {
            metadata: CommunityMetadata { modularity, num_communities: communities.len() },
            communities,
        };

        self.cache.put(key, analysis.clone());
        Ok(analysis)
    }

    /// One-pass cohesion over every community at once:
    /// `Σ intra_similarity / Σ total_similarity` on `SIMILAR_TO` weight.
    async fn cohesion(&self) -> Result<HashMap<i64, f64>> {
        let query = Query::new(
            "MATCH (c1:Course)-[r:SIMILAR_TO]->(c2:Course) \
             WITH c1.communityId AS a, c2.communityId AS b, r.weight AS w \
             WITH a, sum(CASE WHEN a = b THEN w ELSE 0 END) AS intra, sum(w) AS total \
             RETURN a AS communityId, CASE WHEN total = 0 THEN 0.0 ELSE intra / total END AS cohesion"
                .to_string(),
        );
        let rows = self.engine.run(query).await?;
        let mut by_community = HashMap::new();
        for row in &rows {
            let Ok(community_id) = row.get::<i64>("communityId") else { continue };
            let cohesion = row.get::<f64>("cohesion").unwrap_or(0.0);
            by_community.insert(community_id, cohesion);
        }
        Ok(by_community)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_enforces_minimum_size_and_resolution_range() {
        let clamped = CommunityParams { min_community_size: 0, resolution: 50.0 }.clamped();
        assert_eq!(clamped.min_community_size, 1);
        assert_eq!(clamped.resolution, 10.0);
    }

    #[test]
    fn higher_resolution_yields_tighter_tolerance() {
        let loose = (1.0_f64 / 0.5_f64).clamp(0.0001, 1.0);
        let tight = (1.0_f64 / 5.0_f64).clamp(0.0001, 1.0);
        assert!(tight < loose);
    }
}
