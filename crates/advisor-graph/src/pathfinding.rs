//! `PathfindingService` — shortest/alternative prerequisite paths via GDS,
//! plus a pure-Rust semester-plan optimizer (topological order + greedy
//! bin-packing) that needs no graph-engine round trip once the caller has
//! already fetched the relevant prerequisite edges.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::{Error, Result};
use advisor_core::types::{EdgeKind, PrerequisiteEdge, DEFAULT_COURSE_CREDITS};
use neo4rs::Query;
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, AlgoCache};
use crate::engine::GraphEngine;
use crate::projection::{ProjectionCatalogManager, PREREQUISITE_GRAPH};

const CACHE_CAPACITY: usize = 512;
const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathResult {
    pub nodes: Vec<String>,
    pub total_weight: f64,
}

pub struct PathfindingService {
    engine: Arc<GraphEngine>,
    projections: Arc<ProjectionCatalogManager>,
    cache: AlgoCache<Vec<PathResult>>,
}

impl PathfindingService {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>, projections: Arc<ProjectionCatalogManager>) -> Self {
        Self {
            engine,
            projections,
            cache: AlgoCache::new(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    pub async fn shortest_path(&self, from: &str, to: &str) -> Result<Option<PathResult>> {
        let key = cache_key(&["shortest".to_string(), from.to_string(), to.to_string()]);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.into_iter().next());
        }

        self.projections.ensure(PREREQUISITE_GRAPH).await?;
        let query = Query::new(
            "MATCH (source:Course {code: $from}), (target:Course {code: $to}) \
             CALL gds.shortestPath.dijkstra.stream($graph, {sourceNode: source, targetNode: target}) \
             YIELD totalCost, nodeIds \
             RETURN totalCost, [id IN nodeIds | gds.util.asNode(id).code] AS path"
                .to_string(),
        )
        .param("graph", PREREQUISITE_GRAPH)
        .param("from", from)
        .param("to", to);

        let rows = self.engine.run(query).await?;
        let result = rows.first().and_then(|row| {
            let nodes = row.get::<Vec<String>>("path").ok()?;
            let total_weight = row.get::<f64>("totalCost").ok()?;
            Some(PathResult { nodes, total_weight })
        });

        self.cache.put(key, result.clone().into_iter().collect());
        Ok(result)
    }

    pub async fn alternative_paths(&self, from: &str, to: &str, k: u32) -> Result<Vec<PathResult>> {
        let k = k.clamp(1, 10);
        let key = cache_key(&["alt".to_string(), from.to_string(), to.to_string(), k.to_string()]);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        self.projections.ensure(PREREQUISITE_GRAPH).await?;
        let query = Query::new(
            "MATCH (source:Course {code: $from}), (target:Course {code: $to}) \
             CALL gds.shortestPath.yens.stream($graph, {sourceNode: source, targetNode: target, k: $k}) \
             YIELD totalCost, nodeIds \
             RETURN totalCost, [id IN nodeIds | gds.util.asNode(id).code] AS path \
             ORDER BY totalCost ASC"
                .to_string(),
        )
        .param("graph", PREREQUISITE_GRAPH)
        .param("from", from)
        .param("to", to)
        .param("k", i64::from(k));

        let rows = self.engine.run(query).await?;
        let results: Vec<PathResult> = rows
            .iter()
            .filter_map(|row| {
                let nodes = row.get::<Vec<String>>("path").ok()?;
                let total_weight = row.get::<f64>("totalCost").ok()?;
                Some(PathResult { nodes, total_weight })
            })
            .collect();

        self.cache.put(key, results.clone());
        Ok(results)
    }

    /// Prerequisite chains leading into `course_code`, up to `depth` hops,
    /// capped at `limit` candidate paths. Plain Cypher variable-length
    /// traversal — no GDS algorithm involved.
    pub async fn prerequisite_paths(&self, course_code: &str, depth: u32, limit: u32) -> Result<Vec<PathResult>> {
        let depth = depth.clamp(1, 3);
        let limit = limit.clamp(1, 3);
        let key = cache_key(&["prereq_paths".to_string(), course_code.to_string(), depth.to_string(), limit.to_string()]);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let cypher = format!(
            "MATCH path = (c:Course {{code: $code}})<-[:PREREQUISITE*1..{depth}]-(prereq:Course) \
             RETURN [n IN nodes(path) | n.code] AS nodes, length(path) AS total_weight \
             ORDER BY total_weight ASC LIMIT {limit}"
        );
        let query = Query::new(cypher).param("code", course_code);

        let rows = self.engine.run(query).await?;
        let results: Vec<PathResult> = rows
            .iter()
            .filter_map(|row| {
                let nodes = row.get::<Vec<String>>("nodes").ok()?;
                let total_weight = row.get::<i64>("total_weight").ok()? as f64;
                Some(PathResult { nodes, total_weight })
            })
            .collect();

        self.cache.put(key, results.clone());
        Ok(results)
    }

    /// All prerequisite edges among the ancestors of `target_courses`
    /// (inclusive of the targets themselves) — the single round trip that
    /// feeds `optimize_semester_plan`'s "retrieve all ancestor
    /// prerequisites" step.
    pub async fn ancestor_edges(&self, target_courses: &[String]) -> Result<Vec<PrerequisiteEdge>> {
        let query = Query::new(
            "MATCH (target:Course) WHERE target.code IN $targets \
             OPTIONAL MATCH (ancestor:Course)-[:PREREQUISITE*1..]->(target) \
             WITH collect(DISTINCT ancestor.code) AS ancestors \
             WITH ancestors + $targets AS scope \
             MATCH (a:Course)-[r:PREREQUISITE]->(b:Course) \
             WHERE a.code IN scope AND b.code IN scope \
             RETURN DISTINCT a.code AS from, b.code AS to, \
                    coalesce(r.confidence, 1.0) AS confidence, coalesce(r.weight, 1.0) AS weight"
                .to_string(),
        )
        .param("targets", target_courses.to_vec());

        let rows = self.engine.run(query).await?;
        let edges = rows
            .iter()
            .filter_map(|row| {
                let from = row.get::<String>("from").ok()?;
                let to = row.get::<String>("to").ok()?;
                let confidence = row.get::<f64>("confidence").unwrap_or(1.0) as f32;
                let weight = row.get::<f64>("weight").unwrap_or(1.0) as f32;
                Some(PrerequisiteEdge { from, to, kind: EdgeKind::Prerequisite, confidence, weight })
            })
            .collect();
        Ok(edges)
    }

    /// Nodes and prerequisite edges within `depth` hops (either direction)
    /// of `course_codes` — backs `/api/graph/subgraph`.
    pub async fn subgraph(&self, course_codes: &[String], depth: u32) -> Result<(Vec<String>, Vec<PrerequisiteEdge>)> {
        let depth = depth.clamp(1, 4);
        let cypher = format!(
            "MATCH (c:Course) WHERE c.code IN $codes \
             MATCH path = (c)-[:PREREQUISITE*0..{depth}]-(neighbor:Course) \
             WITH collect(DISTINCT neighbor.code) AS scope \
             MATCH (a:Course)-[r:PREREQUISITE]->(b:Course) \
             WHERE a.code IN scope AND b.code IN scope \
             RETURN DISTINCT scope, a.code AS from, b.code AS to, \
                    coalesce(r.confidence, 1.0) AS confidence, coalesce(r.weight, 1.0) AS weight"
        );
        let query = Query::new(cypher).param("codes", course_codes.to_vec());

        let rows = self.engine.run(query).await?;
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for row in &rows {
            if nodes.is_empty() {
                if let Ok(scope) = row.get::<Vec<String>>("scope") {
                    nodes = scope;
                }
            }
            if let (Ok(from), Ok(to)) = (row.get::<String>("from"), row.get::<String>("to")) {
                let confidence = row.get::<f64>("confidence").unwrap_or(1.0) as f32;
                let weight = row.get::<f64>("weight").unwrap_or(1.0) as f32;
                edges.push(PrerequisiteEdge { from, to, kind: EdgeKind::Prerequisite, confidence, weight });
            }
        }
        Ok((nodes, edges))
    }

    /// Credit weight for each of `codes`, defaulting to
    /// `DEFAULT_COURSE_CREDITS` for any course missing a `credits` property.
    pub async fn course_credits(&self, codes: &[String]) -> Result<HashMap<String, f32>> {
        let query = Query::new(
            "MATCH (c:Course) WHERE c.code IN $codes \
             RETURN c.code AS code, coalesce(c.credits, $default_credits) AS credits"
                .to_string(),
        )
        .param("codes", codes.to_vec())
        .param("default_credits", f64::from(DEFAULT_COURSE_CREDITS));

        let rows = self.engine.run(query).await?;
        let mut credits = HashMap::new();
        for row in &rows {
            let Ok(code) = row.get::<String>("code") else { continue };
            let value = row.get::<f64>("credits").unwrap_or(f64::from(DEFAULT_COURSE_CREDITS)) as f32;
            credits.insert(code, value);
        }
        Ok(credits)
    }

    /// Subtract `completed` from `target_courses`, topologically order what
    /// remains (Kahn's algorithm) then greedily fill semesters up to
    /// `max_credits_per_semester`, honoring the partial order. Courses stuck
    /// in a prerequisite cycle are reported in `unscheduled` rather than
    /// failing the whole plan. Pure function of its arguments; needs no
    /// graph-engine round trip.
    pub fn optimize_semester_plan(
        &self,
        edges: &[PrerequisiteEdge],
        target_courses: &[String],
        completed: &[String],
        credits: &HashMap<String, f32>,
        max_credits_per_semester: f32,
    ) -> Result<SemesterPlan> {
        optimize_semester_plan(edges, target_courses, completed, credits, max_credits_per_semester)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemesterPlanMetadata {
    pub to_schedule_count: usize,
    pub unscheduled_count: usize,
    pub scheduling_efficiency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemesterPlan {
    pub semesters: Vec<Vec<String>>,
    pub unscheduled: Vec<String>,
    pub metadata: SemesterPlanMetadata,
}

/// Free-standing implementation of semester planning; kept outside the
/// `impl` block so it can be exercised without a live graph connection.
pub fn optimize_semester_plan(
    edges: &[PrerequisiteEdge],
    target_courses: &[String],
    completed: &[String],
    credits: &HashMap<String, f32>,
    max_credits_per_semester: f32,
) -> Result<SemesterPlan> {
    if max_credits_per_semester <= 0.0 {
        return Err(Error::Validation("max_credits_per_semester must be positive".to_string()));
    }

    let completed_set: HashSet<&str> = completed.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let to_schedule: Vec<String> = target_courses
        .iter()
        .filter(|c| !completed_set.contains(c.as_str()) && seen.insert(c.as_str()))
        .cloned()
        .collect();
    let schedule_set: HashSet<&str> = to_schedule.iter().map(String::as_str).collect();

    let mut in_degree: HashMap<&str, u32> = to_schedule.iter().map(|c| (c.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        if completed_set.contains(edge.from.as_str()) {
            continue;
        }
        if !schedule_set.contains(edge.from.as_str()) || !schedule_set.contains(edge.to.as_str()) {
            continue;
        }
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
        dependents.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(c, _)| *c)
        .collect();
    let mut ordered: Vec<&str> = Vec::with_capacity(to_schedule.len());

    while let Some(course) = queue.pop_front() {
        ordered.push(course);
        if let Some(deps) = dependents.get(course) {
            for dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }
    }

    let ordered_set: HashSet<&str> = ordered.iter().copied().collect();
    let mut unscheduled: Vec<String> =
        to_schedule.iter().filter(|c| !ordered_set.contains(c.as_str())).cloned().collect();

    let mut done: HashSet<&str> = HashSet::new();
    let mut remaining: VecDeque<&str> = ordered.into_iter().collect();
    let mut semesters = Vec::new();

    while !remaining.is_empty() {
        let mut semester = Vec::new();
        let mut semester_credits = 0.0_f32;
        let mut deferred = VecDeque::new();

        while let Some(course) = remaining.pop_front() {
            let prereqs_met = edges
                .iter()
                .filter(|e| e.to == course && schedule_set.contains(e.from.as_str()))
                .all(|e| completed_set.contains(e.from.as_str()) || done.contains(e.from.as_str()));
            if !prereqs_met {
                deferred.push_back(course);
                continue;
            }
            let course_credits = credits.get(course).copied().unwrap_or(DEFAULT_COURSE_CREDITS);
            if !semester.is_empty() && semester_credits + course_credits > max_credits_per_semester {
                deferred.push_back(course);
                continue;
            }
            semester.push(course.to_string());
            semester_credits += course_credits;
        }

        remaining = deferred;
        if semester.is_empty() {
            // No progress possible under the credit budget; whatever is left
            // cannot be scheduled.
            break;
        }
        for course in &semester {
            done.insert(course.as_str());
        }
        semesters.push(semester);
    }

    if !remaining.is_empty() {
        unscheduled.extend(remaining.into_iter().map(String::from));
    }

    let to_schedule_count = to_schedule.len();
    let unscheduled_count = unscheduled.len();
    let scheduling_efficiency =
        if to_schedule_count == 0 { 1.0 } else { 1.0 - (unscheduled_count as f64 / to_schedule_count as f64) };

    Ok(SemesterPlan {
        semesters,
        unscheduled,
        metadata: SemesterPlanMetadata { to_schedule_count, unscheduled_count, scheduling_efficiency },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str) -> PrerequisiteEdge {
        PrerequisiteEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind: advisor_core::types::EdgeKind::Prerequisite,
            confidence: 1.0,
            weight: 1.0,
        }
    }

    fn credits_of(pairs: &[(&str, f32)]) -> HashMap<String, f32> {
        pairs.iter().map(|(c, cr)| (c.to_string(), *cr)).collect()
    }

    #[test]
    fn optimize_semester_plan_respects_prerequisite_order() {
        let edges = vec![edge("CS 1110", "CS 2110"), edge("CS 2110", "CS 3110")];
        let targets = vec!["CS 1110".to_string(), "CS 2110".to_string(), "CS 3110".to_string()];
        let credits = credits_of(&[("CS 1110", 4.0), ("CS 2110", 4.0), ("CS 3110", 4.0)]);
        let plan = optimize_semester_plan(&edges, &targets, &[], &credits, 4.0).unwrap();
        assert_eq!(
            plan.semesters,
            vec![vec!["CS 1110".to_string()], vec!["CS 2110".to_string()], vec!["CS 3110".to_string()]]
        );
        assert!(plan.unscheduled.is_empty());
        assert_eq!(plan.metadata.scheduling_efficiency, 1.0);
    }

    #[test]
    fn optimize_semester_plan_packs_independent_courses_together() {
        let edges = vec![edge("CS 1110", "CS 3110")];
        let targets = vec!["CS 1110".to_string(), "MATH 1910".to_string(), "CS 3110".to_string()];
        let credits = credits_of(&[("CS 1110", 4.0), ("MATH 1910", 4.0), ("CS 3110", 4.0)]);
        let plan = optimize_semester_plan(&edges, &targets, &[], &credits, 8.0).unwrap();
        assert_eq!(plan.semesters[0].len(), 2);
        assert!(plan.semesters.last().unwrap().contains(&"CS 3110".to_string()));
    }

    #[test]
    fn optimize_semester_plan_subtracts_completed_courses() {
        let edges = vec![edge("CS 1110", "CS 2110")];
        let targets = vec!["CS 1110".to_string(), "CS 2110".to_string()];
        let completed = vec!["CS 1110".to_string()];
        let credits = credits_of(&[("CS 2110", 4.0)]);
        let plan = optimize_semester_plan(&edges, &targets, &completed, &credits, 4.0).unwrap();
        assert_eq!(plan.semesters, vec![vec!["CS 2110".to_string()]]);
        assert_eq!(plan.metadata.to_schedule_count, 1);
    }

    #[test]
    fn optimize_semester_plan_reports_cycles_as_unscheduled_without_failing() {
        let edges = vec![edge("A", "B"), edge("B", "A")];
        let targets = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let credits = credits_of(&[("A", 3.0), ("B", 3.0), ("C", 3.0)]);
        let plan = optimize_semester_plan(&edges, &targets, &[], &credits, 3.0).unwrap();
        assert_eq!(plan.unscheduled.len(), 2);
        assert!(plan.semesters.iter().flatten().any(|c| c == "C"));
        assert!(plan.metadata.scheduling_efficiency < 1.0);
    }

    #[test]
    fn optimize_semester_plan_rejects_nonpositive_credit_budget() {
        let result = optimize_semester_plan(&[], &["A".to_string()], &[], &HashMap::new(), 0.0);
        assert!(result.is_err());
    }
}
