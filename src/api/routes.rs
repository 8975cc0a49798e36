//! Engine API Routes
//!
//! JSON endpoints for indexing, querying, community detection, and session
//! lifecycle. Error kinds map onto status codes so callers can distinguish
//! configuration mistakes from retryable failures.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::domain::{
    DocumentInput, EngineInfo, IndexStats, QueryRequest, QueryResult, SessionInfo,
};
use crate::error::EngineError;
use crate::session::SessionConfig;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/documents", post(index_documents))
        .route("/api/sessions/{id}/query", post(query))
        .route("/api/sessions/{id}/communities", post(detect_communities))
        .route("/api/info", get(engine_info))
        .route("/health", get(health))
}

/// Map an engine error onto an HTTP status.
fn error_response(err: &EngineError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        EngineError::Configuration(_) | EngineError::Query(_) => StatusCode::BAD_REQUEST,
        EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Connection(_) => StatusCode::BAD_GATEWAY,
        EngineError::Extraction(_) | EngineError::Embedding(_) | EngineError::Indexing(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            retryable: err.is_retryable(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

// =============================================================================
// Indexing
// =============================================================================

/// A document in an indexing request: either a bare string or an object
/// with an explicit source identifier.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentBody {
    Text(String),
    Full(DocumentInput),
}

impl From<DocumentBody> for DocumentInput {
    fn from(body: DocumentBody) -> Self {
        match body {
            DocumentBody::Text(text) => DocumentInput::new(text),
            DocumentBody::Full(input) => input,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexRequest {
    documents: Vec<DocumentBody>,
    /// Signed so a negative value is rejected rather than silently wrapped.
    #[serde(default)]
    batch_size: Option<i64>,
    /// Session knobs, applied only when this call creates the session.
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    chunk_overlap: Option<usize>,
    #[serde(default)]
    auto_detect_communities: Option<bool>,
}

/// POST /api/sessions/{id}/documents - index a batch of documents.
///
/// The session is created implicitly on first reference.
async fn index_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexStats>, (StatusCode, Json<ErrorBody>)> {
    let defaults = &state.config.session;
    let mut config = SessionConfig::new(&id);
    config.chunk_size = req.chunk_size.unwrap_or(defaults.chunk_size);
    config.chunk_overlap = req.chunk_overlap.unwrap_or(defaults.chunk_overlap);
    config.auto_detect_communities = req
        .auto_detect_communities
        .unwrap_or(defaults.auto_detect_communities);
    config.capability_timeout =
        std::time::Duration::from_secs(defaults.capability_timeout_seconds);

    let documents: Vec<DocumentInput> = req.documents.into_iter().map(Into::into).collect();

    let batch_size = match req.batch_size {
        None => documents.len().max(1),
        Some(n) if n > 0 => n as usize,
        Some(n) => {
            return Err(error_response(&EngineError::Configuration(format!(
                "batch_size must be positive, got {n}"
            ))));
        }
    };

    info!(session_id = %id, documents = documents.len(), batch_size, "index request");

    let session = state.engine.session(config).map_err(|e| error_response(&e))?;
    let stats = session
        .index_documents(documents, batch_size)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(stats))
}

// =============================================================================
// Query
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryBody {
    text: String,
    /// Signed so a negative value is rejected rather than silently wrapped.
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default = "default_true")]
    include_entities: bool,
    #[serde(default = "default_true")]
    include_text_units: bool,
    #[serde(default = "default_true")]
    include_communities: bool,
}

fn default_true() -> bool {
    true
}

/// POST /api/sessions/{id}/query - ranked multi-facet retrieval.
async fn query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, (StatusCode, Json<ErrorBody>)> {
    let top_k = match body.top_k {
        None => 10,
        Some(n) if n >= 0 => n as usize,
        Some(n) => {
            return Err(error_response(&EngineError::Query(format!(
                "top_k must be non-negative, got {n}"
            ))));
        }
    };

    let request = QueryRequest {
        text: body.text,
        top_k,
        include_entities: body.include_entities,
        include_text_units: body.include_text_units,
        include_communities: body.include_communities,
    };

    let session = state
        .engine
        .get_session(&id)
        .map_err(|e| error_response(&e))?;
    let result = session.query(request).await.map_err(|e| error_response(&e))?;

    Ok(Json(result))
}

// =============================================================================
// Communities
// =============================================================================

#[derive(Debug, Serialize)]
struct DetectResponse {
    communities_detected: usize,
}

/// POST /api/sessions/{id}/communities - explicit detection pass.
async fn detect_communities(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DetectResponse>, (StatusCode, Json<ErrorBody>)> {
    let session = state
        .engine
        .get_session(&id)
        .map_err(|e| error_response(&e))?;
    let communities_detected = session
        .detect_communities()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(DetectResponse {
        communities_detected,
    }))
}

// =============================================================================
// Session Lifecycle
// =============================================================================

/// GET /api/sessions - list all sessions.
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.engine.list_sessions())
}

/// GET /api/sessions/{id} - session info.
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, (StatusCode, Json<ErrorBody>)> {
    state
        .engine
        .session_info(&id)
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// DELETE /api/sessions/{id} - close a session, draining pending merges.
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.engine.close_session(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// =============================================================================
// Info / Health
// =============================================================================

/// GET /api/info - engine-wide aggregate counts.
async fn engine_info(State(state): State<AppState>) -> Json<EngineInfo> {
    Json(state.engine.info())
}

/// GET /health - liveness probe.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
