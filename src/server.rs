//! JSON HTTP search API.
//!
//! Serves the built snapshot over HTTP for editor integrations and other
//! documentation tooling. The snapshot is loaded once at startup and held
//! behind an atomically swappable handle, so searches always see one
//! consistent index + metadata pair.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search` | Semantic search (`q`, `k`, `product`, `version`, `lang`) |
//! | `POST` | `/reload` | Re-read the snapshot from disk and swap it in |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `provider_error` (502),
//! `integrity_error` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! documentation clients.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{SearchFilters, SearchHit};
use crate::search::SearchEngine;
use crate::snapshot::{Snapshot, SnapshotHandle};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    /// Application configuration (wrapped in `Arc` for cheap cloning across handlers).
    config: Arc<Config>,
    /// Embedding provider used to encode incoming queries.
    provider: Arc<dyn EmbeddingProvider>,
    /// The live snapshot; swapped atomically by `/reload`.
    snapshots: Arc<SnapshotHandle>,
}

/// Starts the HTTP search server.
///
/// Binds to the address configured in `[server].bind`. Refuses to start if
/// no valid snapshot exists in the data directory: serving without one
/// would turn every request into an error.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let snapshot = Snapshot::load(&config.data.dir)?;
    info!(
        rows = snapshot.index().len(),
        snapshot = %snapshot.index().snapshot_id(),
        "loaded snapshot"
    );

    let state = AppState {
        config,
        provider,
        snapshots: Arc::new(SnapshotHandle::new(snapshot)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/search", get(handle_search))
        .route("/reload", post(handle_reload))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 502 error for embedding backend failures.
fn provider_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "provider_error".to_string(),
        message: message.into(),
    }
}

/// Constructs a 500 error for snapshot consistency failures.
fn integrity_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "integrity_error".to_string(),
        message: message.into(),
    }
}

/// Constructs a generic 500 error.
fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps domain errors onto the HTTP error contract.
fn classify_error(err: Error) -> AppError {
    match err {
        Error::Validation(msg) => bad_request(msg),
        Error::Provider(msg) => provider_error(msg),
        Error::Integrity(msg) => integrity_error(msg),
        other => internal(other.to_string()),
    }
}

// ============ GET /search ============

/// Validated query parameters for `GET /search`.
#[derive(Debug)]
struct SearchParams {
    query: String,
    k: usize,
    filters: SearchFilters,
}

/// Parses and validates the raw query string pairs.
///
/// `q` is required and non-empty; `k` defaults to the configured value and
/// must parse as a positive integer. Filter parameters with empty values
/// count as absent, and unrecognized parameters are ignored.
/// One filter parameter; an empty value counts as not supplied, so
/// `?product=` filters nothing rather than everything.
fn facet(params: &HashMap<String, String>, name: &str) -> Option<String> {
    params.get(name).filter(|v| !v.is_empty()).cloned()
}

fn parse_search_params(
    params: &HashMap<String, String>,
    default_k: usize,
) -> Result<SearchParams> {
    let query = match params.get("q") {
        None => return Err(Error::Validation("missing required parameter: q".into())),
        Some(raw) if raw.trim().is_empty() => {
            return Err(Error::Validation("query must not be empty".into()))
        }
        Some(raw) => raw.trim().to_string(),
    };

    let k = match params.get("k") {
        None => default_k,
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            Error::Validation(format!("k must be a positive integer, got {raw:?}"))
        })?,
    };
    if k == 0 {
        return Err(Error::Validation("k must be at least 1".into()));
    }

    let filters = SearchFilters {
        product: facet(params, "product"),
        version: facet(params, "version"),
        lang: facet(params, "lang"),
    };

    Ok(SearchParams { query, k, filters })
}

/// Handler for `GET /search`.
///
/// Encodes the query, searches the live snapshot, and returns the hits as
/// a JSON array in descending score order.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Json<Vec<SearchHit>>, AppError> {
    let parsed = parse_search_params(&params, state.config.retrieval.default_k)
        .map_err(classify_error)?;

    let engine = SearchEngine::new(
        state.snapshots.current(),
        Arc::clone(&state.provider),
        &state.config.retrieval,
    );
    let hits = engine
        .search(&parsed.query, parsed.k, &parsed.filters)
        .await
        .map_err(classify_error)?;

    Ok(Json(hits))
}

// ============ POST /reload ============

/// JSON response body for `POST /reload`.
#[derive(Serialize)]
struct ReloadResponse {
    status: String,
    snapshot: String,
    rows: usize,
}

/// Handler for `POST /reload`.
///
/// Re-reads the snapshot from the data directory and swaps it in. If the
/// artifacts on disk fail integrity checks, the previous snapshot stays
/// live and the error is reported.
async fn handle_reload(
    State(state): State<AppState>,
) -> std::result::Result<Json<ReloadResponse>, AppError> {
    let snapshot = Snapshot::load(&state.config.data.dir).map_err(classify_error)?;
    let id = snapshot.index().snapshot_id();
    let rows = snapshot.index().len();
    state.snapshots.swap(snapshot);
    info!(snapshot = %id, rows, "reloaded snapshot");

    Ok(Json(ReloadResponse {
        status: "ok".to_string(),
        snapshot: id.to_string(),
        rows,
    }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
