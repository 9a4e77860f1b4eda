//! Thin wrapper over a `neo4rs::Graph` connection, grounded on
//! `Neo4jGraph::new`'s connection-and-introspect pattern.

use std::sync::Arc;

use advisor_core::error::{Error, Result};
use neo4rs::{Graph, Query, Row};

const SERVICE: &str = "neo4j";

pub struct GraphEngine {
    graph: Arc<Graph>,
}

impl GraphEngine {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                service: SERVICE.to_string(),
                detail: format!("failed to connect to neo4j: {e}"),
            })?;
        Ok(Self { graph: Arc::new(graph) })
    }

    /// Run a parameterized query and collect every row. Callers always
    /// build `query` with `neo4rs::Query::new(..).param(..)` — never string
    /// interpolation of user-controlled values.
    pub async fn run(&self, query: Query) -> Result<Vec<Row>> {
        let mut result = self.graph.execute(query).await.map_err(|e| Error::UpstreamUnavailable {
            service: SERVICE.to_string(),
            detail: format!("query failed: {e}"),
        })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::UpstreamUnavailable {
            service: SERVICE.to_string(),
            detail: format!("failed to read result row: {e}"),
        })? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Cheap reachability probe for `/health`.
    pub async fn ping(&self) -> bool {
        self.run(Query::new("RETURN 1".to_string())).await.is_ok()
    }
}
