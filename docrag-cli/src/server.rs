//! Minimal HTTP wrapper around [`RagEngine`].
//!
//! - `POST /api/rag` with `{ "prompt": "...", "k"?: n, "history"?: [...] }`
//!   answers `{ "text": "...", "sources": [...] }`.
//! - `GET /health` reports readiness.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use docrag::{QueryRequest, RagEngine, RagError, SourceRef, Turn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 5000 }
    }
}

#[derive(Debug, Deserialize)]
pub struct RagRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub history: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RagResponse {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/rag", post(rag))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig, engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let app = app_router(AppState { engine });
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docrag server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docrag listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": kind, "message": message.into() }))).into_response()
}

fn engine_error(e: RagError) -> Response {
    match &e {
        RagError::NoContext => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.kind(), e.to_string())
        }
        RagError::InvalidQuery(message) => {
            error_response(StatusCode::BAD_REQUEST, e.kind(), message.clone())
        }
        _ => {
            error!(error = %e, "query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.engine.status().await {
        Ok(status) => Json(json!({
            "status": "ok",
            "ready": status.ready,
            "records": status.records,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "ready": false, "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn rag(
    State(state): State<AppState>,
    payload: Result<Json<RagRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text());
        }
    };

    let prompt = request.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_query", "prompt is required");
    }

    let mut query = QueryRequest::new(prompt).with_history(request.history);
    query.top_k = request.k;

    match state.engine.query(&query).await {
        Ok(answer) => Json(RagResponse { text: answer.text, sources: answer.sources }).into_response(),
        Err(e) => engine_error(e),
    }
}
