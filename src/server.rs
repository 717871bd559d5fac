//! HTTP trigger for batch analysis.
//!
//! Exposes the batch engine and the insight store via a small JSON API used
//! by the review UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/batch-analysis` | Run a batch over `[project].root` |
//! | `GET`  | `/api/insights` | List every insight record |
//! | `GET`  | `/api/insights/{*path}` | One insight record by relative path |
//! | `POST` | `/api/provider/rebuild` | Rebuild the provider from configuration |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response uses the same envelope:
//!
//! ```json
//! { "success": false, "error": "OPENAI_API_KEY environment variable not set" }
//! ```
//!
//! A batch that cannot start (no usable provider, bad project root) returns
//! `500`; a batch that ran always returns `200` with per-file failures
//! counted in `errorCount`. Only one batch runs at a time; a second request
//! while one is in flight gets `409`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::batch::run_batch_with_handle;
use crate::config::Config;
use crate::models::{BatchAnalysisOptions, BatchAnalysisResult, InsightRecord};
use crate::progress::NoProgress;
use crate::provider::ProviderHandle;
use crate::store::{open_store, InsightStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn InsightStore>,
    provider: Arc<ProviderHandle>,
    /// Held for the duration of a batch so two runs never race on one path.
    batch_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn InsightStore>, provider: Arc<ProviderHandle>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            provider,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the router for `state`. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/batch-analysis", post(handle_batch))
        .route("/api/insights", get(handle_list_insights))
        .route("/api/insights/{*path}", get(handle_get_insight))
        .route("/api/provider/rebuild", post(handle_rebuild_provider))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// The provider is built lazily on the first batch request, so the server
/// starts even when credentials are missing; such requests fail with the
/// error envelope instead.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = open_store(&config.store).await?;
    let handle = Arc::new(ProviderHandle::new());
    if let Err(e) = handle.get_or_build(&config.provider) {
        tracing::warn!(error = %e, "analysis provider unavailable; batch requests will fail until fixed");
    }

    let app = router(AppState::new(config.clone(), store, handle));

    println!("Review server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, root = %config.project.root.display(), "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Internal error type that converts into the `{success:false}` envelope.
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

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

// ============ POST /api/batch-analysis ============

/// Runs a batch over the configured project root.
///
/// The body is optional; an empty body means default options.
async fn handle_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchAnalysisResult>, AppError> {
    let options: BatchAnalysisOptions = if body.iter().all(|b| b.is_ascii_whitespace()) {
        BatchAnalysisOptions::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, format!("invalid body: {}", e)))?
    };

    let _running = state.batch_lock.try_lock().map_err(|_| {
        AppError::new(StatusCode::CONFLICT, "a batch analysis is already running")
    })?;

    let result = run_batch_with_handle(
        &state.config.project.root,
        &state.config,
        state.store.clone(),
        &state.provider,
        &options,
        Arc::new(NoProgress),
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %format!("{:#}", e), "batch analysis could not start");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
    })?;

    Ok(Json(result))
}

// ============ GET /api/insights ============

#[derive(Serialize)]
struct InsightListResponse {
    insights: Vec<InsightRecord>,
}

async fn handle_list_insights(
    State(state): State<AppState>,
) -> Result<Json<InsightListResponse>, AppError> {
    let insights = state
        .store
        .all()
        .await
        .map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(InsightListResponse { insights }))
}

// ============ GET /api/insights/{*path} ============

async fn handle_get_insight(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<InsightRecord>, AppError> {
    let path = path.trim_start_matches('/');
    state
        .store
        .get(path)
        .await
        .map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, format!("no insight for: {}", path)))
}

// ============ POST /api/provider/rebuild ============

#[derive(Serialize)]
struct RebuildResponse {
    success: bool,
    provider: String,
    model: String,
}

async fn handle_rebuild_provider(
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>, AppError> {
    let provider = state
        .provider
        .rebuild(&state.config.provider)
        .map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(RebuildResponse {
        success: true,
        provider: provider.name().to_string(),
        model: provider.model().to_string(),
    }))
}
