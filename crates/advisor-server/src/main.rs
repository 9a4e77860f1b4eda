//! Binary entry point for the academic advisor backend.

mod calendar;
mod error;
mod graph_adapters;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use advisor_context::{
    ConflictDetectionContext, DegreeProgressContext, DifficultyContext, EnrollmentContext, GradesCatalog,
    GradesContext, GraphContext, ProfessorContext, ScheduleFitContext, VectorContext,
};
use advisor_core::{AdvisorConfig, ChatOrchestrator, ContextProvider, ProfileStore, TagCache};
use advisor_degree::DegreeProgressEvaluator;
use advisor_graph::{CentralityService, CommunityService, GraphEngine, PathfindingService, ProjectionCatalogManager};
use advisor_llm::{CompletionBackend, OpenAiRouter};
use advisor_schedule::{ScheduleFitConfig, ScheduleFitService};
use advisor_store::RedisKv;
use advisor_vector::{EmbeddingClient, VectorIndex};
use graph_adapters::{GraphRequirementSpecSource, GraphRosterFetcher};
use state::AppState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const CURRENT_TERM: &str = "FA25";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AdvisorConfig::from_env();
    tracing::info!(environment = %config.environment, demo_mode = config.demo_mode, "starting advisor-server");

    let kv = Arc::new(RedisKv::connect(&config.redis_url, Duration::from_millis(config.redis_op_timeout_ms)).await?);
    let graph_engine = Arc::new(GraphEngine::connect(&config.neo4j_uri, &config.neo4j_username, &config.neo4j_password).await?);
    let vector_index = Arc::new(VectorIndex::connect(&config.qdrant_url, config.qdrant_collection_name.clone())?);
    let embeddings = Arc::new(EmbeddingClient::new(config.vllm_base_url.clone(), config.openai_api_key.clone(), Arc::clone(&kv)));

    let projections = Arc::new(ProjectionCatalogManager::new(Arc::clone(&graph_engine)));
    let pathfinding = Arc::new(PathfindingService::new(Arc::clone(&graph_engine), Arc::clone(&projections)));
    let centrality = Arc::new(CentralityService::new(Arc::clone(&graph_engine), Arc::clone(&projections)));
    let community = Arc::new(CommunityService::new(Arc::clone(&graph_engine), Arc::clone(&projections)));

    let roster: Arc<dyn advisor_schedule::RosterFetcher> = Arc::new(GraphRosterFetcher::new(Arc::clone(&graph_engine)));
    let requirement_source: Arc<dyn advisor_degree::RequirementSpecSource> =
        Arc::new(GraphRequirementSpecSource::new(Arc::clone(&graph_engine)));

    let schedule_fit_config = ScheduleFitConfig {
        beam_width: config.schedule_fit_beam_width,
        node_limit: config.schedule_fit_node_limit,
        timeout: Duration::from_millis(config.schedule_fit_timeout_ms),
    };
    let schedule_fit = Arc::new(ScheduleFitService::new(Arc::clone(&roster), Arc::clone(&kv), schedule_fit_config));
    let degree_progress = Arc::new(DegreeProgressEvaluator::new(Arc::clone(&requirement_source), Arc::clone(&kv)));
    let grades = Arc::new(if config.demo_mode {
        tracing::info!("demo mode: using built-in grades fixture instead of grades_csv");
        GradesCatalog::demo_fixture()
    } else {
        GradesCatalog::load(&config.grades_csv)?
    });

    let primary = CompletionBackend::new(config.local_model.clone(), config.vllm_base_url.clone(), config.local_model.clone(), None);
    let fallback = CompletionBackend::new(
        config.fallback_model.clone(),
        "https://api.openai.com/v1".to_string(),
        config.fallback_model.clone(),
        config.openai_api_key.clone(),
    );
    let llm = Arc::new(OpenAiRouter::new(primary, fallback, Duration::from_millis(config.first_token_deadline_ms)));

    let mut providers: Vec<Arc<dyn ContextProvider>> = vec![
        Arc::new(VectorContext::new(Arc::clone(&embeddings), Arc::clone(&vector_index), Arc::clone(&kv))),
        Arc::new(GraphContext::new(Arc::clone(&pathfinding), Arc::clone(&kv))),
        Arc::new(ProfessorContext::new(None, Arc::clone(&kv))),
        Arc::new(DifficultyContext::new(Arc::clone(&grades), Arc::clone(&kv))),
        Arc::new(GradesContext::new(Arc::clone(&grades), Arc::clone(&kv))),
        Arc::new(EnrollmentContext::new(Arc::clone(&kv))),
        Arc::new(ConflictDetectionContext::new(Arc::clone(&roster), Arc::clone(&kv), CURRENT_TERM.to_string())),
    ];
    if config.enable_degree_progress {
        providers.push(Arc::new(DegreeProgressContext::new(DegreeProgressEvaluator::new(
            Arc::clone(&requirement_source),
            Arc::clone(&kv),
        ))));
    }
    if config.enable_schedule_fit {
        providers.push(Arc::new(ScheduleFitContext::new(
            ScheduleFitService::new(Arc::clone(&roster), Arc::clone(&kv), ScheduleFitConfig {
                beam_width: config.schedule_fit_beam_width,
                node_limit: config.schedule_fit_node_limit,
                timeout: Duration::from_millis(config.schedule_fit_timeout_ms),
            }),
            CURRENT_TERM.to_string(),
        )));
    }

    let orchestrator = Arc::new(ChatOrchestrator::new(providers, llm, Arc::clone(&kv), config.clone()));
    let profiles = Arc::new(ProfileStore::new(Arc::clone(&kv)));
    let tag_cache = Arc::new(TagCache::new(Arc::clone(&kv)));

    let state = AppState {
        config: Arc::new(config),
        kv,
        orchestrator,
        profiles,
        tag_cache,
        graph_engine,
        vector_index,
        embeddings,
        projections,
        pathfinding,
        centrality,
        community,
        schedule_fit,
        degree_progress,
        grades,
        started_at: chrono::Utc::now(),
        current_term: CURRENT_TERM.to_string(),
    };

    let app = routes::router(state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(addr = "0.0.0.0:8080", "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
