//! Pipeline HTTP API (§6): `/process`, `/jobs/*`, `/health`, `/admin/*`.
//! Grounded on `original_source/orchestrator/main.py`'s FastAPI routes
//! and the teacher-derived `create_router`/`AppState` shape in
//! `other_examples/...porua__server-src-server.rs`.

use crate::api::state::AppState;
use crate::error::Result;
use crate::orchestrator::{Job, PipelineRequest};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/wait", get(wait_job))
        .route("/jobs/:id/stream", get(stream_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs", get(list_jobs))
        .route("/health", get(health))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/cleanup", post(admin_cleanup))
        .route("/admin/factory-reset", post(admin_factory_reset))
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    status: crate::orchestrator::JobStatus,
    overall_progress: f64,
    message: &'static str,
    youtube_url: String,
}

async fn submit_job(State(state): State<AppState>, Json(request): Json<PipelineRequest>) -> Result<impl IntoResponse> {
    let youtube_url = request.youtube_url.clone();
    let job_id = state.orchestrator.pipeline.submit(request).await?;
    let job = state.orchestrator.pipeline.get(&job_id).await?;
    Ok(Json(SubmitResponse {
        job_id,
        status: job.status,
        overall_progress: job.overall_progress,
        message: "job accepted",
        youtube_url,
    }))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Job>> {
    Ok(Json(state.orchestrator.pipeline.get(&id).await?))
}

#[derive(Debug, Deserialize)]
struct WaitQuery {
    #[serde(default = "default_wait_timeout")]
    timeout: u64,
}

fn default_wait_timeout() -> u64 {
    30
}

async fn wait_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<Job>> {
    let job = state
        .orchestrator
        .pipeline
        .wait(&id, Duration::from_secs(query.timeout))
        .await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default = "default_stream_timeout")]
    timeout: u64,
}

fn default_stream_timeout() -> u64 {
    300
}

async fn stream_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let rx = state
        .orchestrator
        .pipeline
        .stream(id, Duration::from_secs(query.timeout));

    let events = ReceiverStream::new(rx).map(|sse_event| {
        Ok::<_, Infallible>(Event::default().event(sse_event.event).json_data(sse_event.data).unwrap_or_else(|_| Event::default()))
    });

    sse_response(events)
}

fn sse_response<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Job>> {
    let mut job = state.orchestrator.pipeline.get(&id).await?;
    job.mark_cancelled();
    state.orchestrator.store.put(&job).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    50
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Vec<Job>>> {
    Ok(Json(state.orchestrator.store.list(query.limit).await?))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    job_store_reachable: bool,
    pool_workers_alive: usize,
    cache_entries: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let job_store_reachable = state.orchestrator.store.ping().await;
    let pool_workers_alive = state.engine.pool.stats().workers_alive.load(std::sync::atomic::Ordering::SeqCst);
    let cache_entries = state.engine.cache.len();
    Json(HealthResponse {
        status: if job_store_reachable { "ok" } else { "degraded" },
        job_store_reachable,
        pool_workers_alive,
        cache_entries,
    })
}

async fn admin_stats(State(state): State<AppState>) -> Result<Json<crate::orchestrator::JobStoreStats>> {
    Ok(Json(state.orchestrator.store.stats().await?))
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    removed: usize,
}

async fn admin_cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let removed = state
        .orchestrator
        .store
        .sweep(state.config.jobs.ttl_hours as i64)
        .await?;
    Ok(Json(CleanupResponse { removed }))
}

async fn admin_factory_reset(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    // Stage-service resets are out of scope here (§1 Non-goals: the
    // download/normalize/transcribe services are external collaborators);
    // this only clears the orchestrator's own Job Store.
    let removed = state.orchestrator.store.sweep(0).await?;
    Ok(Json(CleanupResponse { removed }))
}
