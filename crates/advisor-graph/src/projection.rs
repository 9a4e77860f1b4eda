//! Projection Catalog Manager — ensures a named GDS in-memory projection
//! exists before an algorithm service queries it, memoizing the existence
//! check for 300 seconds so steady-state traffic doesn't round-trip an
//! `EXISTS` check per request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use advisor_core::error::{Error, Result};
use neo4rs::Query;
use parking_lot::Mutex;

use crate::engine::GraphEngine;

const MEMO_TTL: Duration = Duration::from_secs(300);

pub const PREREQUISITE_GRAPH: &str = "prerequisite_graph";
pub const PREREQUISITE_GRAPH_UNDIRECTED: &str = "prerequisite_graph_undirected";
pub const SIMILARITY_GRAPH: &str = "similarity_graph";

pub struct ProjectionCatalogManager {
    engine: Arc<GraphEngine>,
    checked_at: Mutex<HashMap<String, Instant>>,
}

impl ProjectionCatalogManager {
    #[must_use]
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self {
            engine,
            checked_at: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure `name` exists as a GDS projection, creating it if absent.
    /// Only the three named projections are supported; anything else is a
    /// caller bug, not an upstream failure.
    pub async fn ensure(&self, name: &str) -> Result<()> {
        if !matches!(name, PREREQUISITE_GRAPH | PREREQUISITE_GRAPH_UNDIRECTED | SIMILARITY_GRAPH) {
            return Err(Error::Validation(format!("unknown projection: {name}")));
        }

        if let Some(checked) = self.checked_at.lock().get(name) {
            if checked.elapsed() < MEMO_TTL {
                return Ok(());
            }
        }

        let exists = self.exists(name).await?;
        if !exists {
            self.create(name).await?;
        }
        self.checked_at.lock().insert(name.to_string(), Instant::now());
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let query = Query::new("CALL gds.graph.exists($name) YIELD exists RETURN exists".to_string())
            .param("name", name);
        let rows = self.engine.run(query).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get::<bool>("exists").ok())
            .unwrap_or(false))
    }

    async fn create(&self, name: &str) -> Result<()> {
        let cypher = match name {
            PREREQUISITE_GRAPH => {
                "CALL gds.graph.project($name, 'Course', {PREREQUISITE: {orientation: 'NATURAL'}})"
            }
            PREREQUISITE_GRAPH_UNDIRECTED => {
                "CALL gds.graph.project($name, 'Course', {PREREQUISITE: {orientation: 'UNDIRECTED'}})"
            }
            SIMILARITY_GRAPH => {
                "CALL gds.graph.project($name, 'Course', {SIMILAR_TO: {orientation: 'UNDIRECTED', properties: 'weight'}})"
            }
            _ => unreachable!("validated in ensure()"),
        };
        let query = Query::new(cypher.to_string()).param("name", name);
        self.engine.run(query).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_projection_names_are_the_three_documented_ones() {
        assert_eq!(PREREQUISITE_GRAPH, "prerequisite_graph");
        assert_eq!(PREREQUISITE_GRAPH_UNDIRECTED, "prerequisite_graph_undirected");
        assert_eq!(SIMILARITY_GRAPH, "similarity_graph");
    }
}
