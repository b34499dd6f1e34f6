//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question, JSON response |
//! | `POST` | `/api/query/stream` | Answer a question, SSE token stream |
//! | `GET`  | `/api/stats` | Corpus and index statistics |
//! | `POST` | `/api/reindex` | Run an ingestion pass |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! # Streaming
//!
//! `/api/query/stream` emits three SSE event types in order: one
//! `citations` event with the retrieved context, `token` events as the
//! answer streams in, and one final `done` event with the persisted record
//! id and terminal status. A client that disconnects mid-stream does not
//! abort the run; the query record is persisted either way.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::GenerationClient;
use crate::ingest::{self, IngestReport};
use crate::models::Citation;
use crate::pipeline::{self, QueryEvent};
use crate::snapshot::SnapshotStore;
use crate::store;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub snapshots: Arc<SnapshotStore>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub client: Arc<GenerationClient>,
    /// Serializes ingestion passes; concurrent reindex requests queue up
    /// instead of racing each other.
    pub ingest_lock: Arc<Mutex<()>>,
}

pub fn router(state: AppState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/query/stream", post(handle_query_stream))
        .route("/api/stats", get(handle_stats))
        .route("/api/reindex", post(handle_reindex))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = router(state);

    info!(bind = %bind_addr, "server listening");
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
    code: String,
    message: String,
}

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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    /// When false, the citations list is omitted from the response.
    #[serde(default = "default_want_citations")]
    want_citations: bool,
}

fn default_want_citations() -> bool {
    true
}

#[derive(Serialize)]
struct QueryResponse {
    record_id: String,
    answer: String,
    status: String,
    error: Option<String>,
    citations: Vec<Citation>,
    duration_ms: i64,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let outcome = pipeline::answer_question(
        &state.pool,
        &state.config,
        state.embedder.as_ref(),
        &state.snapshots,
        &state.client,
        &req.question,
        None,
    )
    .await
    .map_err(internal)?;

    Ok(Json(QueryResponse {
        record_id: outcome.record_id,
        answer: outcome.answer,
        status: outcome.status.as_str().to_string(),
        error: outcome.error,
        citations: if req.want_citations {
            outcome.citations
        } else {
            Vec::new()
        },
        duration_ms: outcome.duration_ms,
    }))
}

// ============ POST /api/query/stream ============

#[derive(Serialize)]
struct DoneEvent {
    record_id: String,
    status: String,
    error: Option<String>,
}

async fn handle_query_stream(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let (tx, rx) = mpsc::channel::<QueryEvent>(32);
    let question = req.question.clone();

    // The run is detached from the response: a dropped client closes the
    // event channel but the query still runs to a terminal state and the
    // record still gets persisted.
    tokio::spawn(async move {
        let result = pipeline::answer_question(
            &state.pool,
            &state.config,
            state.embedder.as_ref(),
            &state.snapshots,
            &state.client,
            &question,
            Some(tx),
        )
        .await;
        if let Err(e) = result {
            error!(error = %e, "streaming query failed to persist");
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (sse_event(event), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: QueryEvent) -> Result<Event, Infallible> {
    let event = match event {
        QueryEvent::Citations(citations) => Event::default()
            .event("citations")
            .data(serde_json::to_string(&citations).unwrap_or_else(|_| "[]".to_string())),
        QueryEvent::Token(token) => Event::default()
            .event("token")
            .data(serde_json::to_string(&token).unwrap_or_default()),
        QueryEvent::Done {
            record_id,
            status,
            error,
        } => {
            let body = DoneEvent {
                record_id,
                status: status.as_str().to_string(),
                error,
            };
            Event::default()
                .event("done")
                .data(serde_json::to_string(&body).unwrap_or_default())
        }
    };
    Ok(event)
}

// ============ GET /api/stats ============

#[derive(Serialize)]
struct StatsResponse {
    total_documents: i64,
    total_chunks: i64,
    total_bytes: i64,
    generation: i64,
    last_ingested_at: Option<i64>,
    vector_index: bool,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = store::corpus_stats(&state.pool).await.map_err(internal)?;
    let snapshot = state.snapshots.current();
    Ok(Json(StatsResponse {
        total_documents: stats.total_documents,
        total_chunks: stats.total_chunks,
        total_bytes: stats.total_bytes,
        generation: stats.generation,
        last_ingested_at: stats.last_ingested_at,
        vector_index: snapshot.vector.is_some(),
    }))
}

// ============ POST /api/reindex ============

#[derive(Deserialize)]
struct ReindexRequest {
    #[serde(default)]
    force: bool,
}

async fn handle_reindex(
    State(state): State<AppState>,
    Json(req): Json<ReindexRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let _guard = state.ingest_lock.lock().await;
    let report = ingest::ingest(
        &state.pool,
        &state.config,
        state.embedder.as_ref(),
        &state.snapshots,
        req.force,
    )
    .await
    .map_err(internal)?;

    Ok(Json(report))
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
