//! Request handlers for every route in the HTTP surface.

use std::convert::Infallible;

use advisor_core::error::Error as CoreError;
use advisor_core::event_channel::{DisconnectSignal, Frame};
use advisor_core::types::StudentProfile;
use advisor_graph::{CentralityAlgorithm, CentralityParams, CommunityParams};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::state::AppState;

// ---------------------------------------------------------------- chat ----

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: Option<String>,
    pub student_id: String,
    pub message: String,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    if req.message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message must not be empty".to_string()));
    }
    let conversation_id = req.conversation_id.unwrap_or_else(advisor_core::event_channel::new_stream_id);
    let disconnect = DisconnectSignal::new();

    let frames = state
        .orchestrator
        .chat(&conversation_id, &req.student_id, req.message, disconnect)
        .await?;

    let stream = frames.map(|frame: Frame| {
        let mut event = Event::default().event(frame.event).data(frame.data);
        if let Some(id) = frame.id {
            event = event.id(id.to_string());
        }
        if let Some(retry_ms) = frame.retry_ms {
            event = event.retry(std::time::Duration::from_millis(retry_ms));
        }
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub student_id: String,
    pub course_code: String,
    pub message: String,
}

pub async fn explain(State(state): State<AppState>, Json(req): Json<ExplainRequest>) -> Result<Json<serde_json::Value>> {
    let text = state.orchestrator.explain(&req.student_id, &req.course_code, &req.message).await?;
    Ok(Json(json!({ "course_code": req.course_code, "explanation": text })))
}

pub async fn get_conversation(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let conversation = state
        .orchestrator
        .conversation(&id)
        .await?
        .ok_or_else(|| ApiError::Core(CoreError::NotFound(format!("conversation {id}"))))?;
    Ok(Json(serde_json::to_value(conversation).unwrap_or(serde_json::Value::Null)))
}

// -------------------------------------------------------------- health ----

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let neo4j_ok = state.graph_engine.ping().await;
    let qdrant_ok = state.vector_index.ping().await;
    let status = if neo4j_ok && qdrant_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "services": { "qdrant": qdrant_ok, "neo4j": neo4j_ok },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn metrics() -> impl IntoResponse {
    match advisor_core::metrics::render() {
        Ok(body) => (axum::http::StatusCode::OK, body),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// --------------------------------------------------------------- graph ----

#[derive(Debug, Deserialize)]
pub struct RagWithGraphRequest {
    pub message: String,
    pub student_id: String,
}

pub async fn rag_with_graph(State(state): State<AppState>, Json(req): Json<RagWithGraphRequest>) -> Result<Json<serde_json::Value>> {
    let vector = state.embeddings.embed(&req.message).await?;
    let similar = state.vector_index.search(&vector, 5, 0.7).await?;

    let profile = state
        .profiles
        .get(&req.student_id)
        .await?
        .unwrap_or_else(|| StudentProfile::default_for(&req.student_id));

    let mut graph_paths = Vec::new();
    for course in similar.iter().take(3) {
        if let Ok(paths) = state.pathfinding.prerequisite_paths(&course.code, 3, 3).await {
            graph_paths.push(json!({ "course_code": course.code, "paths": paths }));
        }
    }

    Ok(Json(json!({
        "similar_courses": similar,
        "graph_context": graph_paths,
        "profile_major": profile.major,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PrerequisitePathRequest {
    pub course_code: String,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_depth() -> u32 {
    3
}
fn default_limit() -> u32 {
    3
}

pub async fn prerequisite_path(State(state): State<AppState>, Json(req): Json<PrerequisitePathRequest>) -> Result<Json<serde_json::Value>> {
    let paths = state.pathfinding.prerequisite_paths(&req.course_code, req.depth, req.limit).await?;
    Ok(Json(json!({ "course_code": req.course_code, "paths": paths })))
}

#[derive(Debug, Deserialize)]
pub struct CentralityRequest {
    pub algorithm: CentralityAlgorithm,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    #[serde(default = "default_damping")]
    pub damping: f32,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    #[serde(default)]
    pub min_betweenness: f32,
    #[serde(default = "default_min_in_degree")]
    pub min_in_degree: u32,
}

fn default_top_n() -> u32 {
    20
}
fn default_damping() -> f32 {
    0.85
}
fn default_max_iter() -> u32 {
    20
}
fn default_min_in_degree() -> u32 {
    1
}

pub async fn centrality(State(state): State<AppState>, Json(req): Json<CentralityRequest>) -> Result<Json<serde_json::Value>> {
    let params = CentralityParams {
        algorithm: req.algorithm,
        top_n: req.top_n,
        damping: req.damping,
        max_iter: req.max_iter,
        min_betweenness: req.min_betweenness,
        min_in_degree: req.min_in_degree,
    };
    let results = state.centrality.compute(params).await?;
    Ok(Json(json!({ "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct CommunityRequest {
    #[serde(default = "default_min_community_size")]
    pub min_community_size: u32,
    #[serde(default = "default_resolution")]
    pub resolution: f32,
}

fn default_min_community_size() -> u32 {
    3
}
fn default_resolution() -> f32 {
    1.0
}

pub async fn communities(State(state): State<AppState>, Json(req): Json<CommunityRequest>) -> Result<Json<serde_json::Value>> {
    let params = CommunityParams { min_community_size: req.min_community_size, resolution: req.resolution };
    let analysis = state.community.compute(params).await?;
    Ok(Json(json!({ "communities": analysis.communities, "metadata": analysis.metadata })))
}

#[derive(Debug, Deserialize)]
pub struct ShortestPathRequest {
    pub from: String,
    pub to: String,
}

pub async fn shortest_path(State(state): State<AppState>, Json(req): Json<ShortestPathRequest>) -> Result<Json<serde_json::Value>> {
    let result = state.pathfinding.shortest_path(&req.from, &req.to).await?;
    Ok(Json(json!({ "path": result })))
}

#[derive(Debug, Deserialize)]
pub struct AlternativePathsRequest {
    pub from: String,
    pub to: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    3
}

pub async fn alternative_paths(State(state): State<AppState>, Json(req): Json<AlternativePathsRequest>) -> Result<Json<serde_json::Value>> {
    let results = state.pathfinding.alternative_paths(&req.from, &req.to, req.k).await?;
    Ok(Json(json!({ "paths": results })))
}

#[derive(Debug, Deserialize)]
pub struct SemesterPlanRequest {
    pub target_courses: Vec<String>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default = "default_max_credits_per_semester")]
    pub max_credits_per_semester: f32,
}

fn default_max_credits_per_semester() -> f32 {
    16.0
}

pub async fn semester_plan(State(state): State<AppState>, Json(req): Json<SemesterPlanRequest>) -> Result<Json<serde_json::Value>> {
    let edges = state.pathfinding.ancestor_edges(&req.target_courses).await?;
    let credits = state.pathfinding.course_credits(&req.target_courses).await?;
    let plan = state.pathfinding.optimize_semester_plan(
        &edges,
        &req.target_courses,
        &req.completed,
        &credits,
        req.max_credits_per_semester,
    )?;
    Ok(Json(json!({ "semesters": plan.semesters, "unscheduled": plan.unscheduled, "metadata": plan.metadata })))
}

#[derive(Debug, Deserialize)]
pub struct CourseRecommendationsRequest {
    pub student_id: String,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
}

pub async fn course_recommendations(State(state): State<AppState>, Json(req): Json<CourseRecommendationsRequest>) -> Result<Json<serde_json::Value>> {
    let profile = state
        .profiles
        .get(&req.student_id)
        .await?
        .unwrap_or_else(|| StudentProfile::default_for(&req.student_id));

    let params = CentralityParams {
        algorithm: CentralityAlgorithm::PageRank,
        top_n: req.top_n,
        damping: 0.85,
        max_iter: 20,
        min_betweenness: 0.0,
        min_in_degree: 1,
    };
    let ranked = state.centrality.compute(params).await?;
    let completed: std::collections::HashSet<_> = profile.completed.iter().cloned().collect();
    let filtered: Vec<_> = ranked.into_iter().filter(|r| !completed.contains(&r.course_code)).collect();

    Ok(Json(json!({ "recommendations": filtered })))
}

#[derive(Debug, Deserialize)]
pub struct SubgraphRequest {
    pub course_codes: Vec<String>,
    #[serde(default = "default_depth")]
    pub depth: u32,
}

pub async fn subgraph(State(state): State<AppState>, Json(req): Json<SubgraphRequest>) -> Result<Json<serde_json::Value>> {
    let (nodes, edges) = state.pathfinding.subgraph(&req.course_codes, req.depth).await?;
    Ok(Json(json!({ "nodes": nodes, "edges": edges })))
}

// -------------------------------------------------------------- grades ----

pub async fn get_grades(State(state): State<AppState>, Path(course_code): Path<String>) -> Result<Json<serde_json::Value>> {
    let stats = state
        .grades
        .aggregate(&course_code)
        .ok_or_else(|| ApiError::Core(CoreError::NotFound(format!("grades:{course_code}"))))?;
    Ok(Json(serde_json::to_value(stats).unwrap_or(serde_json::Value::Null)))
}

// --------------------------------------------------------------- admin ----

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub tag: String,
    pub new_version: u64,
}

pub async fn invalidate_cache(State(state): State<AppState>, Path(tag): Path<String>) -> Result<Json<InvalidateResponse>> {
    let new_version = state.tag_cache.invalidate(&tag).await?;
    advisor_core::metrics::record_cache_invalidation(&tag);
    Ok(Json(InvalidateResponse { tag, new_version }))
}

// ------------------------------------------------------------- profiles ----

pub async fn get_profile(State(state): State<AppState>, Path(student_id): Path<String>) -> Result<Json<StudentProfile>> {
    let profile = state
        .profiles
        .get(&student_id)
        .await?
        .unwrap_or_else(|| StudentProfile::default_for(&student_id));
    Ok(Json(profile))
}

pub async fn put_profile(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Json(mut profile): Json<StudentProfile>,
) -> Result<Json<StudentProfile>> {
    profile.id = student_id;
    profile.normalize_course_codes();
    state.profiles.put(&profile).await?;
    Ok(Json(profile))
}

pub async fn patch_profile(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Json(mut incoming): Json<StudentProfile>,
) -> Result<Json<StudentProfile>> {
    incoming.id = student_id;
    incoming.normalize_course_codes();
    let merged = state.profiles.merge_atomic(incoming).await?;
    Ok(Json(merged))
}

// ------------------------------------------------------------ calendar ----

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub courses: String,
    #[serde(default = "default_student_name")]
    pub student_name: String,
}

fn default_student_name() -> String {
    "Student".to_string()
}

pub async fn export_ics(State(state): State<AppState>, Query(q): Query<CalendarQuery>) -> Result<impl IntoResponse> {
    let course_codes: Vec<String> = q.courses.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if course_codes.is_empty() {
        return Err(ApiError::InvalidRequest("courses query parameter must list at least one course".to_string()));
    }

    let mut bundles = Vec::new();
    for code in &course_codes {
        if let Ok(b) = state.schedule_fit.bundles_for(&state.current_term, code).await {
            bundles.extend(b);
        }
    }

    let ics = crate::calendar::build_calendar(&q.student_name, &bundles);
    let headers = [
        (axum::http::header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
        (axum::http::header::CONTENT_DISPOSITION, "attachment; filename=\"schedule.ics\""),
    ];
    Ok((headers, ics))
}
