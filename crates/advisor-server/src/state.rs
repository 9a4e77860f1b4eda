//! `AppState` — every collaborator the HTTP handlers share, wired once at
//! startup in `main.rs`.

use std::sync::Arc;

use advisor_context::GradesCatalog;
use advisor_core::{AdvisorConfig, ChatOrchestrator, ProfileStore, TagCache};
use advisor_degree::DegreeProgressEvaluator;
use advisor_graph::{CentralityService, CommunityService, GraphEngine, PathfindingService, ProjectionCatalogManager};
use advisor_schedule::ScheduleFitService;
use advisor_store::RedisKv;
use advisor_vector::{EmbeddingClient, VectorIndex};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AdvisorConfig>,
    pub kv: Arc<RedisKv>,
    pub orchestrator: Arc<ChatOrchestrator<RedisKv>>,
    pub profiles: Arc<ProfileStore<RedisKv>>,
    pub tag_cache: Arc<TagCache<RedisKv>>,

    pub graph_engine: Arc<GraphEngine>,
    pub vector_index: Arc<VectorIndex>,
    pub embeddings: Arc<EmbeddingClient<RedisKv>>,
    pub projections: Arc<ProjectionCatalogManager>,
    pub pathfinding: Arc<PathfindingService>,
    pub centrality: Arc<CentralityService>,
    pub community: Arc<CommunityService>,

    pub schedule_fit: Arc<ScheduleFitService<RedisKv>>,
    pub degree_progress: Arc<DegreeProgressEvaluator<RedisKv>>,
    pub grades: Arc<GradesCatalog>,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub current_term: String,
}
