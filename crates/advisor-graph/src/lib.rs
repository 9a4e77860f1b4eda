pub mod cache;
pub mod centrality;
pub mod community;
pub mod engine;
pub mod pathfinding;
pub mod projection;

pub use cache::AlgoCache;
pub use centrality::{CentralityAlgorithm, CentralityParams, CentralityResult, CentralityService};
pub use community::{CommunityAnalysis, CommunityMetadata, CommunityParams, CommunityResult, CommunityService};
pub use engine::GraphEngine;
pub use pathfinding::{PathResult, PathfindingService, SemesterPlan, SemesterPlanMetadata};
pub use projection::{
    ProjectionCatalogManager, PREREQUISITE_GRAPH, PREREQUISITE_GRAPH_UNDIRECTED, SIMILARITY_GRAPH,
};
