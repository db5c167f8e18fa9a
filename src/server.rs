//! HTTP boundary.
//!
//! Exposes ingestion, question answering, and maintenance over a JSON
//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Ingest extracted text for a session |
//! | `POST` | `/ask` | Answer a question with citations |
//! | `POST` | `/admin/sweep` | Run a retention sweep now |
//! | `DELETE` | `/documents/{id}` | Delete one document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "kind": "RateLimited", "detail": "...", "retry_after": 1200 } }
//! ```
//!
//! Kinds: `IngestionError` (400), `RateLimited` (429), `NoRelevantContent`
//! (404), `GenerationUnavailable` (502), `EmbeddingUnavailable` (502),
//! `IndexUnavailable` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! front-ends.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::Answerer;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{IndexError, IngestError, QueryError};
use crate::generate;
use crate::ingest::{ingest_text, IngestRequest};
use crate::lifecycle::{self, DocLocks};
use crate::models::{Answer, IngestReceipt};
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
    answerer: Arc<Answerer>,
    locks: Arc<DocLocks>,
}

/// Start the HTTP server on the configured bind address.
///
/// Connects to the database, wires up the embedding provider and the
/// generation router (missing API keys fail here, at startup), spawns the
/// periodic retention sweeper, and serves until the process terminates.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let embedder: Arc<dyn EmbeddingProvider> =
        embedding::create_provider(&config.embedding)?.into();
    let router = generate::Router::from_config(&config.generation)?;
    let answerer = Arc::new(Answerer::new(
        pool.clone(),
        config,
        embedder.clone(),
        router,
    ));
    let locks = Arc::new(DocLocks::new());

    lifecycle::spawn_sweeper(
        pool.clone(),
        locks.clone(),
        config.retention.retention_secs(),
        config.retention.sweep_interval_secs,
    );

    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        embedder,
        answerer,
        locks,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/admin/sweep", post(handle_sweep))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("askdocs server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error kind (e.g. `"RateLimited"`).
    kind: String,
    /// Human-readable detail.
    detail: String,
    /// Seconds until a rate-limited session may retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<i64>,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
    retry_after: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind.to_string(),
                detail: self.detail,
                retry_after: self.retry_after,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let detail = err.to_string();
        match err {
            QueryError::RateLimited { retry_after } => AppError {
                status: StatusCode::TOO_MANY_REQUESTS,
                kind: "RateLimited",
                detail,
                retry_after: Some(retry_after),
            },
            QueryError::NoRelevantContent => AppError {
                status: StatusCode::NOT_FOUND,
                kind: "NoRelevantContent",
                detail,
                retry_after: None,
            },
            QueryError::GenerationUnavailable { .. } => AppError {
                status: StatusCode::BAD_GATEWAY,
                kind: "GenerationUnavailable",
                detail,
                retry_after: None,
            },
            QueryError::Embed(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                kind: "EmbeddingUnavailable",
                detail,
                retry_after: None,
            },
            QueryError::Index(_) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "IndexUnavailable",
                detail,
                retry_after: None,
            },
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let detail = err.to_string();
        match err {
            IngestError::EmptyText | IngestError::Embed(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                kind: "IngestionError",
                detail,
                retry_after: None,
            },
            IngestError::Index(_) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "IndexUnavailable",
                detail,
                retry_after: None,
            },
        }
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "IndexUnavailable",
            detail: err.to_string(),
            retry_after: None,
        }
    }
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestBody {
    session_key: String,
    filename: String,
    text: String,
    #[serde(default)]
    is_sample: bool,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestReceipt>, AppError> {
    let request = IngestRequest {
        session_key: body.session_key,
        filename: body.filename,
        text: body.text,
        is_sample: body.is_sample,
    };
    let receipt = ingest_text(
        &state.pool,
        &state.locks,
        state.embedder.as_ref(),
        &state.config,
        &request,
        chrono::Utc::now().timestamp(),
    )
    .await?;

    Ok(Json(receipt))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskBody {
    session_key: String,
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<Answer>, AppError> {
    let answer = state
        .answerer
        .answer(
            &body.session_key,
            &body.question,
            chrono::Utc::now().timestamp(),
        )
        .await?;

    Ok(Json(answer))
}

// ============ POST /admin/sweep ============

#[derive(Deserialize, Default)]
struct SweepBody {
    /// Override for the sweep clock; defaults to wall time.
    now: Option<i64>,
}

#[derive(Serialize)]
struct SweepResponse {
    expired: usize,
    deleted: usize,
    failed: usize,
}

async fn handle_sweep(
    State(state): State<AppState>,
    body: Option<Json<SweepBody>>,
) -> Result<Json<SweepResponse>, AppError> {
    let now = body
        .and_then(|Json(b)| b.now)
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let report = lifecycle::sweep(
        &state.pool,
        &state.locks,
        state.config.retention.retention_secs(),
        now,
    )
    .await?;

    Ok(Json(SweepResponse {
        expired: report.expired,
        deleted: report.deleted,
        failed: report.failed,
    }))
}

// ============ DELETE /documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = lifecycle::delete_document(&state.pool, &state.locks, &id).await?;
    Ok(Json(DeleteResponse { deleted }))
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
