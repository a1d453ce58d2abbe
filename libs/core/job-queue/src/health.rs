//! Health and admin HTTP handlers for queue workers.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`), which ping the job store
//! - Prometheus metrics (`/metrics`)
//! - Job inspection and cancellation (`/admin/jobs/*`)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::job::{JobId, JobState};
use crate::metrics;
use crate::store::JobStore;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for the admin endpoints
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn JobStore>,
    pub app_name: String,
    pub app_version: String,
}

impl AdminState {
    pub fn new(
        store: Arc<dyn JobStore>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Always OK while the process serves requests
pub async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// OK only when the job store answers
pub async fn ready_handler(
    State(state): State<AdminState>,
) -> Result<Json<Value>, ApiError> {
    match state.store.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ready",
            "checks": { "job_store": "ok" }
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "job_store": format!("error: {e}") }
            })),
        )),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// `GET /admin/jobs/stats`
pub async fn job_stats_handler(
    State(state): State<AdminState>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.stats().await.map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
pub struct JobListParams {
    /// Defaults to PENDING
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// `GET /admin/jobs?state=DELAYED&limit=50`
pub async fn job_list_handler(
    State(state): State<AdminState>,
    Query(params): Query<JobListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let job_state = match params.state.as_deref() {
        None => JobState::Pending,
        Some(raw) => raw.parse::<JobState>().map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown job state '{raw}'") })),
            )
        })?,
    };

    // Cap limit at 500
    let limit = params.limit.min(500);
    let jobs = state
        .store
        .list(job_state, limit)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "state": job_state,
        "limit": limit,
        "count": jobs.len(),
        "jobs": jobs,
    })))
}

/// `GET /admin/jobs/{id}`
pub async fn job_get_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    match state.store.get(id).await.map_err(internal)? {
        Some(job) => Ok(Json(job)),
        None => Err(not_found(id)),
    }
}

/// `DELETE /admin/jobs/{id}`: only jobs that have not started can be cancelled
pub async fn job_cancel_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    if state.store.cancel(id).await.map_err(internal)? {
        return Ok(Json(json!({ "success": true, "job_id": id })));
    }

    match state.store.get(id).await.map_err(internal)? {
        Some(job) => Err((
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("job is {} and can no longer be cancelled", job.state),
                "job_id": id
            })),
        )),
        None => Err(not_found(id)),
    }
}

fn parse_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid job id '{raw}'") })),
        )
    })
}

fn not_found(id: JobId) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Job not found", "job_id": id })),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Health, readiness, metrics and job admin endpoints
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/jobs/stats", get(job_stats_handler))
        .route("/admin/jobs", get(job_list_handler))
        .route(
            "/admin/jobs/{id}",
            get(job_get_handler).delete(job_cancel_handler),
        )
        .with_state(state)
}
