//! Graph-backed implementations of the `advisor_schedule::RosterFetcher`
//! and `advisor_degree::RequirementSpecSource` seams — one Cypher round
//! trip each, matching the query style already established in
//! `advisor_graph::pathfinding`.

use std::sync::Arc;

use advisor_core::error::{Error, Result};
use advisor_core::types::{RequirementKind, RequirementSpec, Satisfier, SectionBundle, SectionMeeting};
use advisor_graph::GraphEngine;
use advisor_schedule::RosterFetcher;
use async_trait::async_trait;
use neo4rs::Query;

pub struct GraphRosterFetcher {
    engine: Arc<GraphEngine>,
}

impl GraphRosterFetcher {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RosterFetcher for GraphRosterFetcher {
    async fn fetch_bundles(&self, term: &str, course_code: &str) -> Result<Vec<SectionBundle>> {
        let query = Query::new(
            "MATCH (c:Course {code: $code})-[:HAS_SECTION]->(s:Section {term: $term}) \
             RETURN s.bundle_id AS bundle_id, s.days AS days, s.start_min AS start_min, s.end_min AS end_min"
                .to_string(),
        )
        .param("code", course_code.to_string())
        .param("term", term.to_string());

        let rows = self.engine.run(query).await?;
        let mut by_bundle: std::collections::HashMap<String, Vec<SectionMeeting>> = std::collections::HashMap::new();
        for row in &rows {
            let Ok(bundle_id) = row.get::<String>("bundle_id") else { continue };
            let days: Vec<String> = row.get("days").unwrap_or_default();
            let start_min: i64 = row.get("start_min").unwrap_or(0);
            let end_min: i64 = row.get("end_min").unwrap_or(0);
            let meeting = SectionMeeting {
                days: days.iter().filter_map(|d| d.chars().next()).collect(),
                start_min: start_min.clamp(0, i64::from(u16::MAX)) as u16,
                end_min: end_min.clamp(0, i64::from(u16::MAX)) as u16,
            };
            by_bundle.entry(bundle_id).or_default().push(meeting);
        }

        Ok(by_bundle
            .into_iter()
            .map(|(bundle_id, meetings)| SectionBundle { bundle_id, course_code: course_code.to_string(), meetings })
            .collect())
    }
}

pub struct GraphRequirementSpecSource {
    engine: Arc<GraphEngine>,
}

impl GraphRequirementSpecSource {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self { engine }
    }
}

fn requirement_kind(raw: &str) -> RequirementKind {
    match raw {
        "CREDITS_AT_LEAST" => RequirementKind::CreditsAtLeast,
        "ALL_OF_SET" => RequirementKind::AllOfSet,
        _ => RequirementKind::CountAtLeast,
    }
}

#[async_trait]
impl advisor_degree::RequirementSpecSource for GraphRequirementSpecSource {
    async fn fetch_specs(&self, major: &str) -> Result<Vec<RequirementSpec>> {
        let query = Query::new(
            "MATCH (m:Major {code: $major})-[:HAS_REQUIREMENT]->(r:Requirement) \
             OPTIONAL MATCH (r)-[rel:SATISFIED_BY]->(c:Course) \
             RETURN r.id AS id, r.summary AS summary, r.kind AS kind, \
                    r.min_count AS min_count, r.min_credits AS min_credits, \
                    c.code AS satisfier_code, coalesce(rel.credits, 3.0) AS satisfier_credits"
                .to_string(),
        )
        .param("major", major.to_string());

        let rows = self
            .engine
            .run(query)
            .await
            .map_err(|e| Error::UpstreamUnavailable { service: "neo4j".to_string(), detail: e.to_string() })?;

        let mut order: Vec<String> = Vec::new();
        let mut specs: std::collections::HashMap<String, RequirementSpec> = std::collections::HashMap::new();
        for row in &rows {
            let Ok(id) = row.get::<String>("id") else { continue };
            specs.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                RequirementSpec {
                    id: id.clone(),
                    summary: row.get::<String>("summary").unwrap_or_default(),
                    kind: requirement_kind(&row.get::<String>("kind").unwrap_or_default()),
                    min_count: row.get::<i64>("min_count").unwrap_or(0).max(0) as u32,
                    min_credits: row.get::<f64>("min_credits").unwrap_or(0.0) as f32,
                    satisfiers: Vec::new(),
                }
            });

            if let Ok(code) = row.get::<String>("satisfier_code") {
                let credits = row.get::<f64>("satisfier_credits").unwrap_or(3.0) as f32;
                if let Some(spec) = specs.get_mut(&id) {
                    spec.satisfiers.push(Satisfier { code, credits });
                }
            }
        }

        Ok(order.into_iter().filter_map(|id| specs.remove(&id)).collect())
    }
}
