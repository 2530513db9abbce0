//! HTTP boundary
//!
//! Axum router and handlers for the screenshot service:
//!
//! - `POST /screenshots` — run the capture pipeline, stream the zip
//! - `GET /screenshots` — most recently produced archive
//! - `GET /screenshots/:id` — archive for one request id
//! - `GET /` — liveness probe
//!
//! The archive index maps request ids to archive paths and tracks the
//! latest id; an entry is only published after packaging has completed,
//! so a partially written archive is never served.

use crate::cleanup::CleanupScheduler;
use crate::error::Error;
use crate::pipeline::CapturePipeline;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info, instrument};

/// Header carrying the request id of a freshly produced archive
pub const CAPTURE_ID_HEADER: &str = "x-capture-id";

/// Published archives, addressable by request id.
///
/// The latest pointer is what `GET /screenshots` serves; addressing by
/// id avoids the stale-pointer race between two finishing requests.
#[derive(Default)]
pub struct ArchiveIndex {
    inner: RwLock<IndexState>,
}

#[derive(Default)]
struct IndexState {
    latest: Option<i64>,
    paths: HashMap<i64, PathBuf>,
}

impl ArchiveIndex {
    /// Publish a finished archive. Must only be called after packaging
    /// has completed.
    pub async fn publish(&self, id: i64, path: PathBuf) {
        let mut state = self.inner.write().await;
        state.paths.insert(id, path);
        state.latest = Some(id);
    }

    /// Path of the most recently published archive.
    pub async fn latest(&self) -> Option<PathBuf> {
        let state = self.inner.read().await;
        state.latest.and_then(|id| state.paths.get(&id).cloned())
    }

    /// Path of the archive for a specific request id.
    pub async fn get(&self, id: i64) -> Option<PathBuf> {
        self.inner.read().await.paths.get(&id).cloned()
    }

    /// Drop the entry for a deleted archive. The latest pointer is
    /// cleared too when it referred to the evicted id, so the index
    /// never addresses paths cleanup has already removed.
    pub async fn remove(&self, id: i64) {
        let mut state = self.inner.write().await;
        state.paths.remove(&id);
        if state.latest == Some(id) {
            state.latest = None;
        }
    }
}

/// Shared state for all handlers.
pub struct AppState {
    /// Capture orchestrator
    pub pipeline: CapturePipeline,
    /// Published archives
    pub archives: ArchiveIndex,
    /// Deferred artifact deletion
    pub cleanup: CleanupScheduler,
}

impl AppState {
    /// Schedule the artifacts of a finished request for deletion and
    /// evict the index entry once they are gone.
    pub fn retire_after_grace(self: &Arc<Self>, id: i64, dir: PathBuf, archive: PathBuf) {
        let state = self.clone();
        self.cleanup.schedule_then(dir, archive, async move {
            state.archives.remove(id).await;
        });
    }
}

/// JSON error body, matching the shapes clients already parse.
#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ErrorBody {
    fn client(error: impl Into<String>) -> Self {
        Self {
            success: None,
            error: error.into(),
            warnings: None,
            detail: None,
        }
    }

    fn zero_capture(warnings: Vec<String>) -> Self {
        Self {
            success: Some(false),
            error: "No screenshot could be captured".to_string(),
            warnings: Some(warnings),
            detail: None,
        }
    }

    fn server(detail: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            error: "Internal server error".to_string(),
            warnings: None,
            detail: Some(detail.into()),
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/screenshots", post(create_screenshots).get(latest_archive))
        .route("/screenshots/:id", get(archive_by_id))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

/// Run one capture request and stream back the archive.
#[instrument(skip(state, body))]
async fn create_screenshots(
    State(state): State<Arc<AppState>>,
    body: Option<Json<serde_json::Value>>,
) -> Response {
    // The url field is extracted by hand so a missing field is a plain
    // 400, before any navigation or session acquisition.
    let url = body
        .as_ref()
        .and_then(|Json(v)| v.get("url"))
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let Some(url) = url else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::client("URL is required")),
        )
            .into_response();
    };

    let outcome = match state.pipeline.capture(&url).await {
        Ok(outcome) => outcome,
        Err(e) => return capture_error_response(e),
    };

    state
        .archives
        .publish(outcome.id, outcome.archive.clone())
        .await;

    // Open before scheduling cleanup: the open handle keeps streaming
    // even after the grace-period deletion unlinks the file.
    let file = match tokio::fs::File::open(&outcome.archive).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open finished archive: {}", e);
            state.retire_after_grace(outcome.id, outcome.dir, outcome.archive);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::server(e.to_string())),
            )
                .into_response();
        }
    };
    let size = file.metadata().await.map(|m| m.len()).unwrap_or(0);

    info!(
        id = outcome.id,
        size,
        warnings = outcome.warnings.len(),
        "Archive handed off"
    );
    state.retire_after_grace(outcome.id, outcome.dir, outcome.archive);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"screenshots.zip\""),
    );
    if let Ok(id) = HeaderValue::from_str(&outcome.id.to_string()) {
        headers.insert(CAPTURE_ID_HEADER, id);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    (StatusCode::OK, headers, body).into_response()
}

/// Map pipeline errors onto the HTTP taxonomy: client input and
/// zero-capture are 400, everything structural is 500.
fn capture_error_response(err: Error) -> Response {
    match err {
        Error::InvalidInput(msg) => {
            (StatusCode::BAD_REQUEST, Json(ErrorBody::client(msg))).into_response()
        }
        Error::ZeroCapture(warnings) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::zero_capture(warnings)),
        )
            .into_response(),
        other => {
            error!("Capture failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::server(other.to_string())),
            )
                .into_response()
        }
    }
}

/// Serve the most recently produced archive.
async fn latest_archive(State(state): State<Arc<AppState>>) -> Response {
    match state.archives.latest().await {
        Some(path) => serve_archive(&path).await,
        None => (StatusCode::NOT_FOUND, "No archive available").into_response(),
    }
}

/// Serve the archive for one request id.
async fn archive_by_id(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.archives.get(id).await {
        Some(path) => serve_archive(&path).await,
        None => (StatusCode::NOT_FOUND, "No archive available").into_response(),
    }
}

/// Stream an archive off disk; it may already have been cleaned up.
async fn serve_archive(path: &std::path::Path) -> Response {
    match tokio::fs::File::open(path).await {
        Ok(file) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/zip"),
            );
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"screenshots.zip\""),
            );
            let body = Body::from_stream(ReaderStream::new(file));
            (StatusCode::OK, headers, body).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "No archive available").into_response(),
    }
}
