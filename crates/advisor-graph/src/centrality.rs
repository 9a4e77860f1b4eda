//! `CentralityService` — pageRank / betweenness / in-degree over the
//! prerequisite graph, via a single batched GDS + Cypher query (`UNION
//! ALL` of the three streams joined back to course metadata), grounded on
//! `run_batched_centrality_analysis`'s one-round-trip design.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::Result;
use neo4rs::Query;
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, AlgoCache};
use crate::engine::GraphEngine;
use crate::projection::{ProjectionCatalogManager, PREREQUISITE_GRAPH, PREREQUISITE_GRAPH_UNDIRECTED};

const CACHE_CAPACITY: usize = 256;
const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityAlgorithm {
    PageRank,
    Betweenness,
    InDegree,
}

impl CentralityAlgorithm {
    fn as_str(self) -> &'static str {
        match self {
            CentralityAlgorithm::PageRank => "pagerank",
            CentralityAlgorithm::Betweenness => "betweenness",
            CentralityAlgorithm::InDegree => "in_degree",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CentralityParams {
    pub algorithm: CentralityAlgorithm,
    pub top_n: u32,
    pub damping: f32,
    pub max_iter: u32,
    pub min_betweenness: f32,
    pub min_in_degree: u32,
}

impl CentralityParams {
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            algorithm: self.algorithm,
            top_n: self.top_n.clamp(1, 1000),
            damping: self.damping.clamp(0.01, 0.99),
            max_iter: self.max_iter.clamp(1, 1000),
            min_betweenness: self.min_betweenness.clamp(0.0, 1.0),
            min_in_degree: self.min_in_degree.max(1),
        }
    }

    fn cache_parts(&self) -> Vec<String> {
        vec![
            self.algorithm.as_str().to_string(),
            self.top_n.to_string(),
            self.damping.to_string(),
            self.max_iter.to_string(),
            self.min_betweenness.to_string(),
            self.min_in_degree.to_string(),
        ]
    }
}

/// One ranked course from a centrality pass, with the node metadata the
/// batched query joins back in alongside the raw score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CentralityResult {
    pub course_code: String,
    pub title: String,
    pub subject: String,
    pub level: i32,
    pub score: f64,
    pub rank: u32,
}

struct BatchedRow {
    kind: String,
    course_code: String,
    title: String,
    subject: String,
    level: i32,
    score: f64,
}

pub struct CentralityService {
    engine: Arc<GraphEngine>,
    projections: Arc<ProjectionCatalogManager>,
    cache: AlgoCache<Vec<CentralityResult>>,
}

impl CentralityService {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>, projections: Arc<ProjectionCatalogManager>) -> Self {
        Self {
            engine,
            projections,
            cache: AlgoCache::new(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    /// Run PageRank, betweenness, and in-degree in one round trip via
    /// `UNION ALL`, then return the ranked list for `params.algorithm`.
    pub async fn compute(&self, params: CentralityParams) -> Result<Vec<CentralityResult>> {
        let params = params.clamped();
        let key = cache_key(&params.cache_parts());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        self.projections.ensure(PREREQUISITE_GRAPH).await?;
        self.projections.ensure(PREREQUISITE_GRAPH_UNDIRECTED).await?;

        let query = Query::new(
            "CALL gds.pageRank.stream($graph, {dampingFactor: $damping, maxIterations: $maxIter}) \
             YIELD nodeId, score \
             MATCH (c:Course) WHERE id(c) = nodeId \
             RETURN 'pagerank' AS kind, c.code AS courseCode, coalesce(c.title, '') AS title, \
                    coalesce(c.subject, '') AS subject, coalesce(c.level, 0) AS level, score AS score \
             UNION ALL \
             CALL gds.betweenness.stream($undirectedGraph) \
             YIELD nodeId, score \
             WHERE score >= $minBetweenness \
             MATCH (c:Course) WHERE id(c) = nodeId \
             RETURN 'betweenness' AS kind, c.code AS courseCode, coalesce(c.title, '') AS title, \
                    coalesce(c.subject, '') AS subject, coalesce(c.level, 0) AS level, score AS score \
             UNION ALL \
             MATCH (c:Course) \
             WITH c, size((c)<-[:PREREQUISITE]-()) AS inDegree \
             WHERE inDegree >= $minInDegree \
             RETURN 'in_degree' AS kind, c.code AS courseCode, coalesce(c.title, '') AS title, \
                    coalesce(c.subject, '') AS subject, coalesce(c.level, 0) AS level, toFloat(inDegree) AS score"
                .to_string(),
        )
        .param("graph", PREREQUISITE_GRAPH)
        .param("undirectedGraph", PREREQUISITE_GRAPH_UNDIRECTED)
        .param("damping", f64::from(params.damping))
        .param("maxIter", i64::from(params.max_iter))
        .param("minBetweenness", f64::from(params.min_betweenness))
        .param("minInDegree", i64::from(params.min_in_degree));

        let rows = self.engine.run(query).await?;
        let mut by_kind: HashMap<String, Vec<BatchedRow>> = HashMap::new();
        for row in &rows {
            let Ok(kind) = row.get::<String>("kind") else { continue };
            let Ok(course_code) = row.get::<String>("courseCode") else { continue };
            let batched = BatchedRow {
                kind: kind.clone(),
                course_code,
                title: row.get::<String>("title").unwrap_or_default(),
                subject: row.get::<String>("subject").unwrap_or_default(),
                level: row.get::<i64>("level").unwrap_or(0) as i32,
                score: row.get::<f64>("score").unwrap_or(0.0),
            };
            by_kind.entry(kind).or_default().push(batched);
        }

        let mut selected = by_kind.remove(params.algorithm.as_str()).unwrap_or_default();
        selected.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        selected.truncate(params.top_n as usize);

        let results: Vec<CentralityResult> = selected
            .into_iter()
            .enumerate()
            .map(|(i, row)| CentralityResult {
                course_code: row.course_code,
                title: row.title,
                subject: row.subject,
                level: row.level,
                score: row.score,
                rank: i as u32 + 1,
            })
            .collect();

        self.cache.put(key, results.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CentralityParams {
        CentralityParams {
            algorithm: CentralityAlgorithm::PageRank,
            top_n: 5000,
            damping: 5.0,
            max_iter: 0,
            min_betweenness: -1.0,
            min_in_degree: 0,
        }
    }

    #[test]
    fn clamping_bounds_every_field() {
        let clamped = params().clamped();
        assert_eq!(clamped.top_n, 1000);
        assert_eq!(clamped.damping, 0.99);
        assert_eq!(clamped.max_iter, 1);
        assert_eq!(clamped.min_betweenness, 0.0);
        assert_eq!(clamped.min_in_degree, 1);
    }

    #[test]
    fn cache_parts_differ_by_algorithm() {
        let pr = CentralityParams { algorithm: CentralityAlgorithm::PageRank, ..params() }.clamped();
        let bw = CentralityParams { algorithm: CentralityAlgorithm::Betweenness, ..params() }.clamped();
        assert_ne!(cache_key(&pr.cache_parts()), cache_key(&bw.cache_parts()));
    }

    #[test]
    fn rank_is_assigned_in_descending_score_order() {
        let mut rows = vec![
            BatchedRow { kind: "pagerank".to_string(), course_code: "CS 2110".to_string(), title: String::new(), subject: String::new(), level: 2110, score: 0.4 },
            BatchedRow { kind: "pagerank".to_string(), course_code: "CS 1110".to_string(), title: String::new(), subject: String::new(), level: 1110, score: 0.9 },
        ];
        rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        assert_eq!(rows[0].course_code, "CS 1110");
        assert_eq!(rows[1].course_code, "CS 2110");
    }
}
