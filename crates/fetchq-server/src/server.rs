//! HTTP surface: JSON endpoints over the job registry, probe, and history.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use fetchq_core::history::HistoryEntry;
use fetchq_core::job::{DownloadMode, JobView};
use fetchq_core::probe::{self, MediaInfo, ProbeError};
use fetchq_core::registry::JobRegistry;
use fetchq_core::storage;


#[derive(Clone)]
pub struct AppState {
    registry: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

/// The browser UI is served from another origin during development, so CORS
/// stays permissive on this localhost-only service.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", post(info))
        .route("/mode", post(set_mode))
        .route("/download", post(download))
        .route("/progress", get(progress))
        .route("/cancel/{job_id}", post(cancel))
        .route("/open/{job_id}", get(open_folder))
        .route("/history", get(history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Timeout(String),
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Timeout => AppError::Timeout(err.to_string()),
            ProbeError::EmptyOutput | ProbeError::MalformedOutput | ProbeError::Spawn(_) => {
                AppError::Internal(err.to_string())
            }
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}

// ─── Requests & responses ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    #[serde(default)]
    pub queue: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeResponse {
    pub queue: bool,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn require_url(url: Option<String>) -> Result<String, AppError> {
    let url = url
        .ok_or_else(|| AppError::BadRequest("URL required".to_string()))?
        .trim()
        .to_string();
    if url.is_empty() {
        return Err(AppError::BadRequest("URL cannot be empty".to_string()));
    }
    Ok(url)
}

async fn info(
    State(state): State<AppState>,
    Json(payload): Json<InfoRequest>,
) -> Result<Json<MediaInfo>, AppError> {
    let url = require_url(payload.url)?;
    let media = probe::probe(state.registry.config(), &url).await?;
    Ok(Json(media))
}

async fn set_mode(
    State(state): State<AppState>,
    Json(payload): Json<ModeRequest>,
) -> Json<ModeResponse> {
    state.registry.set_queue_mode(payload.queue);
    Json(ModeResponse {
        queue: state.registry.queue_mode(),
    })
}

async fn download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, AppError> {
    let url = require_url(payload.url)?;
    let mode: DownloadMode = payload
        .mode
        .as_deref()
        .unwrap_or("mp4")
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid mode. Use 'mp3' or 'mp4'".to_string()))?;

    let job_id = state.registry.submit(&url, mode);
    Ok(Json(DownloadResponse { job_id }))
}

async fn progress(State(state): State<AppState>) -> Json<HashMap<String, JobView>> {
    Json(state.registry.snapshot())
}

async fn cancel(State(state): State<AppState>, Path(job_id): Path<String>) -> Json<OkResponse> {
    state.registry.cancel(&job_id);
    Json(OkResponse { ok: true })
}

async fn open_folder(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<OkResponse>, AppError> {
    let folder = state
        .registry
        .job_folder(&job_id)
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;
    storage::open_folder(&folder).map_err(|e| {
        tracing::error!(job_id = %job_id, "open folder failed: {:#}", e);
        AppError::Internal("Failed to open folder".to_string())
    })?;
    Ok(Json(OkResponse { ok: true }))
}

async fn history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.registry.history().load())
}
