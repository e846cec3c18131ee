//! HTTP API for submitting reports and polling analysis results.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness message |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/analyze` | Multipart upload (`file`, optional `query`); returns a task id |
//! | `GET`  | `/results/{id}` | Status, and the result or error once terminal |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid file type. Please upload a PDF." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `queue_unavailable` (503), `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::agents::DEFAULT_QUERY;
use crate::config::Config;
use crate::error::TransientInfraError;
use crate::models::{format_ts_iso, JobStatus};
use crate::pipeline::AnalysisServices;
use crate::queue::JobQueue;
use crate::store::ResultStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    queue: JobQueue,
}

impl AppState {
    pub fn new(config: Arc<Config>, queue: JobQueue) -> Self {
        Self { config, queue }
    }
}

/// Start the store, the worker pool and the HTTP listener on `[server].bind`.
/// Runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());

    std::fs::create_dir_all(&config.server.upload_dir)?;
    let store = ResultStore::open(&config).await?;
    let services = AnalysisServices::from_config(&config)?;
    let queue = JobQueue::start(&config.jobs, store, services).await?;

    let app = build_router(AppState::new(Arc::clone(&config), queue));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("Report analyser listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_mb.saturating_mul(1024 * 1024);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .route("/results/{id}", get(handle_results))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TransientInfraError> for AppError {
    fn from(e: TransientInfraError) -> Self {
        tracing::error!(error = %e, "request failed on infrastructure");
        AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "queue_unavailable",
            message: e.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET / and GET /health ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Blood Test Report Analyser API is running",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

#[derive(Serialize)]
struct SubmitResponse {
    status: &'static str,
    message: &'static str,
    task_id: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut query: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                upload = Some((filename, bytes.to_vec()));
            }
            "query" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid query field: {}", e)))?;
                query = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("file is required"))?;
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(bad_request("Invalid file type. Please upload a PDF."));
    }

    let query = query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let upload_dir = &state.config.server.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| internal(format!("failed to create upload dir: {}", e)))?;
    let path: PathBuf =
        upload_dir.join(format!("{}_{}", Uuid::new_v4(), sanitize_filename(&filename)));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| internal(format!("failed to save upload: {}", e)))?;

    let task_id = state
        .queue
        .submit(&path.display().to_string(), &query)
        .await?;
    tracing::info!(task_id = %task_id, bytes = bytes.len(), "report accepted");

    Ok(Json(SubmitResponse {
        status: "success",
        message: "Analysis task has been submitted.",
        task_id,
    }))
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "report.pdf".to_string()
    } else {
        cleaned
    }
}

// ============ GET /results/{id} ============

#[derive(Serialize)]
struct ResultResponse {
    task_id: String,
    status: JobStatus,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, AppError> {
    let request = state
        .queue
        .status(&id)
        .await?
        .ok_or_else(|| not_found("Task not found."))?;

    let result = match request.status {
        JobStatus::Completed => state.queue.result(&id).await?.map(|r| r.content),
        _ => None,
    };
    let error = match request.status {
        JobStatus::Failed => request.error,
        _ => None,
    };

    Ok(Json(ResultResponse {
        task_id: request.id,
        status: request.status,
        created_at: format_ts_iso(request.created_at),
        result,
        error,
    }))
}
