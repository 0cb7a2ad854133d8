use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use roadmate_core::error::AgentError;
use serde_json::{json, Value};
use std::convert::Infallible;

/// Error body returned by every route: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = match &e {
            AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AgentError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::ModelResponseMalformed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind = e.kind(), "Request failed: {}", e);
            return Self {
                status,
                message: "Internal server error".into(),
            };
        }
        tracing::warn!(kind = e.kind(), "Request failed: {}", e);
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

async fn index() -> &'static str {
    "hello world"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "agent": state.orchestrator.profile().name,
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
}

struct ChatInput {
    message: String,
    session_id: String,
}

/// Both fields must be present, non-empty strings.
fn chat_input(body: Result<Json<Value>, JsonRejection>) -> Result<ChatInput, ApiError> {
    let Json(body) =
        body.map_err(|e| ApiError::bad_request(format!("Request body must be JSON: {}", e.body_text())))?;

    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request(format!("Field '{}' is required and must be a string", name)))
    };

    Ok(ChatInput {
        message: field("message")?,
        session_id: field("sessionId")?,
    })
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let input = chat_input(body)?;
    let reply = state
        .orchestrator
        .send_message(&input.session_id, &input.message)
        .await?;

    Ok(Json(json!({
        "sessionId": input.session_id,
        "reply": reply,
    })))
}

async fn chat_stream(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = chat_input(body)?;
    let events = state
        .orchestrator
        .stream_message(&input.session_id, &input.message)?;

    let stream = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_payload().to_string())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

// ── Sessions ────────────────────────────────────────────────────────────

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/sessions/{id}/transcript", get(transcript))
}

async fn transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let turns = state.orchestrator.transcript(&id).await?;
    Ok(Json(json!({
        "sessionId": id,
        "turns": turns,
    })))
}
