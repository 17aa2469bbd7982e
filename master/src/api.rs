//! HTTP job administration API.
//!
//! JSON in, JSON out, every response wrapped in the `{success, data, error}`
//! envelope. Domain failures (bad cron expression, unknown job) come back as
//! `success: false` with an error message rather than transport-level status
//! codes, so callers handle one shape.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use common::constants::limits;
use common::job::Job;
use common::logstore::LogStore;
use common::records::LogRecord;

use crate::jobs::JobManager;
use crate::workers::WorkerRegistry;

pub struct AppState {
    pub jobs: JobManager,
    pub workers: WorkerRegistry,
    pub logs: LogStore,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    name: String,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_log_limit")]
    limit: i64,
}

fn default_log_limit() -> i64 {
    limits::DEFAULT_LOG_PAGE_SIZE
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/job/save", post(save_job))
        .route("/job/delete", post(delete_job))
        .route("/job/list", get(list_jobs))
        .route("/job/kill", post(kill_job))
        .route("/job/log", get(list_logs))
        .route("/worker/list", get(list_workers))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn save_job(
    State(state): State<Arc<AppState>>,
    Json(job): Json<Job>,
) -> ResponseJson<ApiResponse<Option<Job>>> {
    match state.jobs.save(&job).await {
        Ok(previous) => ResponseJson(ApiResponse::ok(previous)),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NameRequest>,
) -> ResponseJson<ApiResponse<Option<Job>>> {
    match state.jobs.delete(&request.name).await {
        Ok(removed) => ResponseJson(ApiResponse::ok(removed)),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> ResponseJson<ApiResponse<Vec<Job>>> {
    match state.jobs.list().await {
        Ok(jobs) => ResponseJson(ApiResponse::ok(jobs)),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}

async fn kill_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NameRequest>,
) -> ResponseJson<ApiResponse<()>> {
    match state.jobs.kill(&request.name).await {
        Ok(()) => ResponseJson(ApiResponse::ok_empty()),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> ResponseJson<ApiResponse<Vec<LogRecord>>> {
    let limit = query.limit.clamp(1, limits::MAX_LOG_PAGE_SIZE);
    let skip = query.skip.max(0);
    match state.logs.list_logs(&query.name, skip, limit).await {
        Ok(records) => ResponseJson(ApiResponse::ok(records)),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}

async fn list_workers(
    State(state): State<Arc<AppState>>,
) -> ResponseJson<ApiResponse<Vec<String>>> {
    match state.workers.list().await {
        Ok(workers) => ResponseJson(ApiResponse::ok(workers)),
        Err(e) => ResponseJson(ApiResponse::error(e.to_string())),
    }
}
