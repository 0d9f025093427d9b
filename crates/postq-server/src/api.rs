//! HTTP front end
//!
//! Producers `PUT /{queue}?v={message}`, consumers `GET /{queue}?timeout={secs}`.
//! The queue name is the whole path after the leading `/`, so it may contain
//! further slashes. Administrative endpoints live under `/api/v1`.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use postq_core::Broker;
use postq_types::{Error, QueueInfo, QueueStats, Result};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Response header carrying the dequeued message's id
pub const MESSAGE_ID_HEADER: &str = "x-message-id";

// ==================== App State ====================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    broker: Arc<Broker>,
    /// Cap applied to consumer timeouts
    max_wait: Option<Duration>,
}

impl AppState {
    pub fn new(broker: Arc<Broker>, max_wait: Option<Duration>) -> Self {
        Self { broker, max_wait }
    }
}

// ==================== Request/Response Types ====================

/// Enqueue query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct EnqueueQuery {
    /// Message to enqueue. When absent the request body is used.
    #[serde(default)]
    v: Option<String>,
}

/// Dequeue query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct DequeueQuery {
    /// Seconds to wait for a message (absent or 0 = do not wait)
    #[serde(default)]
    timeout: Option<String>,
}

/// API Error response
#[derive(Debug, Serialize, ToSchema)]
struct ApiErrorBody {
    /// Error message
    error: String,
    /// Error code
    code: String,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    /// Health status
    status: String,
    /// Server version
    version: String,
    /// Number of known queues
    queues: usize,
}

// ==================== Error Handling ====================

/// Wrapper for postq errors to implement IntoResponse
struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::QueueNotFound(_) => (StatusCode::NOT_FOUND, "QUEUE_NOT_FOUND"),
            Error::NoMessage(_) => (StatusCode::NOT_FOUND, "NO_MESSAGE"),
            Error::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "INVALID_MESSAGE"),
            Error::InvalidTimeout(_) => (StatusCode::BAD_REQUEST, "INVALID_TIMEOUT"),
            Error::InvalidQueueName(_) => (StatusCode::BAD_REQUEST, "INVALID_QUEUE_NAME"),
        };

        let body = Json(ApiErrorBody {
            error: self.0.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

/// Queue name taken from the whole request path after the leading `/`.
///
/// `/a/b` names the queue `a/b` and `/` names the empty queue.
struct QueueName(String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for QueueName {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(QueueName(queue_name_from_path(parts.uri.path())?))
    }
}

fn queue_name_from_path(path: &str) -> Result<String> {
    let raw = path.strip_prefix('/').unwrap_or(path);
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|_| Error::InvalidQueueName(raw.to_string()))
}

/// Parse a timeout given in whole seconds.
///
/// Absent or empty means no wait, negative values clamp to zero, and the
/// result is capped at `max_wait`.
fn parse_timeout(raw: Option<&str>, max_wait: Option<Duration>) -> Result<Duration> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(Duration::ZERO);
    };

    let seconds: i64 = raw
        .parse()
        .map_err(|_| Error::InvalidTimeout(raw.to_string()))?;
    let timeout = Duration::from_secs(seconds.max(0) as u64);

    Ok(match max_wait {
        Some(max) => timeout.min(max),
        None => timeout,
    })
}

// ==================== OpenAPI Documentation ====================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "postq API",
        version = "0.1.0",
        description = "postq - In-memory named-queue message broker",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        health,
        list_queues,
        get_queue_stats,
        enqueue_message,
        dequeue_message,
    ),
    components(
        schemas(
            HealthResponse,
            QueueInfo,
            QueueStats,
            ApiErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "queues", description = "Queue introspection endpoints"),
        (name = "messages", description = "Message operations endpoints")
    )
)]
struct ApiDoc;

// ==================== Handlers ====================

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queues: state.broker.queue_count(),
    })
}

/// Generated OpenAPI document
async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// List all queues
#[utoipa::path(
    get,
    path = "/api/v1/queues",
    tag = "queues",
    responses(
        (status = 200, description = "List of all queues", body = Vec<QueueInfo>)
    )
)]
async fn list_queues(State(state): State<AppState>) -> Json<Vec<QueueInfo>> {
    Json(state.broker.list_queues())
}

/// Get queue statistics
#[utoipa::path(
    get,
    path = "/api/v1/stats/{name}",
    tag = "queues",
    params(
        ("name" = String, Path, description = "Queue name, may contain `/`")
    ),
    responses(
        (status = 200, description = "Queue statistics", body = QueueStats),
        (status = 404, description = "Queue not found", body = ApiErrorBody)
    )
)]
async fn get_queue_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> std::result::Result<Json<QueueStats>, AppError> {
    let stats = state
        .broker
        .queue_stats(&name)
        .ok_or(Error::QueueNotFound(name))?;
    Ok(Json(stats))
}

/// Enqueue a message
#[utoipa::path(
    put,
    path = "/{queue}",
    tag = "messages",
    params(
        ("queue" = String, Path, description = "Queue name"),
        EnqueueQuery
    ),
    request_body(content = String, description = "Message body, used when `v` is absent"),
    responses(
        (status = 200, description = "Message accepted"),
        (status = 400, description = "Empty message", body = ApiErrorBody)
    )
)]
async fn enqueue_message(
    State(state): State<AppState>,
    QueueName(queue): QueueName,
    Query(query): Query<EnqueueQuery>,
    body: Bytes,
) -> std::result::Result<StatusCode, AppError> {
    let message = message_body(query, body)?;
    let message_id = state.broker.enqueue(&queue, message);
    debug!(queue = %queue, message_id = %message_id, "Message accepted");
    Ok(StatusCode::OK)
}

/// Prefer the `v` parameter, fall back to the request body
fn message_body(query: EnqueueQuery, body: Bytes) -> Result<Bytes> {
    let message = match query.v {
        Some(v) if !v.is_empty() => Bytes::from(v),
        _ => body,
    };
    if message.is_empty() {
        return Err(Error::InvalidMessage("message must not be empty".to_string()));
    }
    Ok(message)
}

/// Dequeue a message, optionally waiting for one
#[utoipa::path(
    get,
    path = "/{queue}",
    tag = "messages",
    params(
        ("queue" = String, Path, description = "Queue name"),
        DequeueQuery
    ),
    responses(
        (status = 200, description = "Message body", body = String, content_type = "text/plain"),
        (status = 400, description = "Invalid timeout", body = ApiErrorBody),
        (status = 404, description = "No message within the timeout", body = ApiErrorBody)
    )
)]
async fn dequeue_message(
    State(state): State<AppState>,
    QueueName(queue): QueueName,
    Query(query): Query<DequeueQuery>,
) -> std::result::Result<Response, AppError> {
    let timeout = parse_timeout(query.timeout.as_deref(), state.max_wait)?;

    let message = state
        .broker
        .dequeue(&queue, timeout)
        .await
        .ok_or(Error::NoMessage(queue))?;

    let content_type = if message.body_as_str().is_some() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                HeaderName::from_static(MESSAGE_ID_HEADER),
                message.id.to_string(),
            ),
        ],
        message.body,
    )
        .into_response())
}

// ==================== Router ====================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Admin
        .route("/api/v1/health", get(health))
        .route("/api/v1/openapi.json", get(openapi))
        .route("/api/v1/queues", get(list_queues))
        .route("/api/v1/stats/*name", get(get_queue_stats))
        // Messages: every other path names a queue
        .fallback(get(dequeue_message).put(enqueue_message))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
