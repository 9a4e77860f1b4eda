//! HTTP route table for the academic advisor backend.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/explain", post(handlers::explain))
        .route("/api/chat/conversation/:id", get(handlers::get_conversation))
        .route("/api/rag_with_graph", post(handlers::rag_with_graph))
        .route("/api/prerequisite_path", post(handlers::prerequisite_path))
        .route("/api/centrality", post(handlers::centrality))
        .route("/api/communities", post(handlers::communities))
        .route("/api/shortest_path", post(handlers::shortest_path))
        .route("/api/alternative_paths", post(handlers::alternative_paths))
        .route("/api/semester_plan", post(handlers::semester_plan))
        .route("/api/course_recommendations", post(handlers::course_recommendations))
        .route("/api/graph/subgraph", post(handlers::subgraph))
        .route("/grades/:course_code", get(handlers::get_grades))
        .route("/admin/cache/invalidate/:tag", post(handlers::invalidate_cache))
        .route(
            "/profiles/:student_id",
            get(handlers::get_profile).put(handlers::put_profile).patch(handlers::patch_profile),
        )
        .route("/calendar/export.ics", get(handlers::export_ics))
        .with_state(state)
}
