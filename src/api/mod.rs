//! HTTP API (axum)
//!
//! - `POST /api/rag/query`  : `{question, mode: "sync"|"async"}`
//! - `GET  /api/rag/result/{task_id}` : 비동기 결과 폴링
//! - `GET  /health` : 인덱스 행 수

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::RagError;
use crate::knowledge::{ChunkIndex, Namespace, QaIndex};
use crate::rag::{RagAnswer, RagPipeline};
use crate::tasks::{TaskQueue, TaskStatus};
use crate::text::short;

// ============================================================================
// State
// ============================================================================

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub tasks: TaskQueue,
    pub chunks: Arc<dyn ChunkIndex>,
    pub qa: Arc<dyn QaIndex>,
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    /// 기본값 "async"
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    status: &'static str,
    result: RagAnswer,
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    task_id: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    chunks: BTreeMap<&'static str, usize>,
    qa_pairs: usize,
}

/// 파이프라인 에러 → HTTP 응답
#[derive(Debug)]
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RagError::InvalidInput => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": RagError::InvalidInput.public_message() })),
            )
                .into_response(),
            err => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "detail": "RAG 처리 중 오류",
                    "error": err.public_message(),
                })),
            )
                .into_response(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/rag/query", post(query))
        .route("/api/rag/result/{task_id}", get(task_result))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// HTTP 서버 실행
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server error")
}

// ============================================================================
// Handlers
// ============================================================================

async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = payload.map_err(|e| {
        tracing::debug!("Rejected query body: {}", e);
        RagError::InvalidInput
    })?;
    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(RagError::InvalidInput)?
        .to_string();

    if request.mode.as_deref().unwrap_or("async") == "async" {
        let task_id = state.tasks.submit(question).await;
        let body = AcceptedResponse {
            task_id,
            status: "processing",
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let start = Instant::now();
    let result = state.pipeline.answer(&question).await?;
    tracing::info!(
        "[SYNC-RAG] q='{}' elapsed={:.2}s",
        short(&question, 30),
        start.elapsed().as_secs_f64()
    );

    let body = SyncResponse {
        status: "done",
        result,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn task_result(State(state): State<AppState>, Path(task_id): Path<String>) -> Json<TaskStatus> {
    Json(state.tasks.poll(&task_id).await)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let mut chunks = BTreeMap::new();
    for namespace in Namespace::ALL {
        let count = state
            .chunks
            .count(namespace)
            .await
            .map_err(RagError::Retrieval)?;
        chunks.insert(namespace.as_str(), count);
    }
    let qa_pairs = state.qa.count_pairs().await.map_err(RagError::Retrieval)?;

    Ok(Json(HealthResponse {
        status: "ok",
        chunks,
        qa_pairs,
    }))
}

// ============================================================================
// Tests
// ============================================================================
