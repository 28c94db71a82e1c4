//! HTTP API
//!
//! Endpoints:
//!   POST   /api/register      - seal and store a field-encrypted registration
//!   GET    /api/students      - recent records, envelope opened per item
//!   PUT    /api/student/{id}  - replace a record's field map
//!   DELETE /api/student/{id}  - remove a record
//!   POST   /api/login         - match submitted credentials against stored ones
//!   GET    /healthz           - liveness probe (always 200 if process is running)
//!   GET    /readyz            - readiness probe (200 if storage is reachable)
//!   GET    /metrics           - Prometheus text format

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use regvault_core::types::{ErrorBody, ListedStudent, LoginRequest, StudentAck};
use regvault_core::RegError;
use serde_json::Value;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::registry::StudentRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StudentRegistry>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState, body_limit: usize, serve_metrics: bool) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "Server running" }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/api/register", post(register))
        .route("/api/students", get(list_students))
        .route("/api/student/{id}", put(update_student).delete(delete_student))
        .route("/api/login", post(login));
    if serve_metrics {
        app = app.route("/metrics", get(metrics));
    }
    app.layer(DefaultBodyLimit::max(body_limit)).with_state(state)
}

/// A `{ message }` response with a status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegError> for ApiError {
    fn from(err: RegError) -> Self {
        match err {
            RegError::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            RegError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "Student not found"),
            other => {
                tracing::error!("request failed: {other}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::BAD_REQUEST
        };
        ApiError::new(status, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn ack(id: Uuid, message: &str) -> Json<StudentAck> {
    Json(StudentAck {
        id: id.to_string(),
        message: message.into(),
    })
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StudentAck> {
    let Json(body) = body?;
    let id = state.registry.register(body).await?;
    Ok(ack(id, "Student registered successfully"))
}

async fn list_students(State(state): State<AppState>) -> ApiResult<Vec<ListedStudent>> {
    Ok(Json(state.registry.list().await?))
}

async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StudentAck> {
    let Json(body) = body?;
    let id = state.registry.update(&id, body).await?;
    Ok(ack(id, "Student updated successfully"))
}

async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StudentAck> {
    let id = state.registry.delete(&id).await?;
    Ok(ack(id, "Student deleted successfully"))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StudentAck> {
    let Json(body) = body?;
    // Wrong-typed fields count as missing
    let request: LoginRequest = serde_json::from_value(body).unwrap_or_default();
    let (Some(email), Some(password)) = (request.email, request.password) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Email and password required",
        ));
    };
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Email and password required",
        ));
    }

    match state.registry.login(&email, &password).await? {
        Some(id) => Ok(ack(id, "Login successful")),
        None => Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials")),
    }
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.ready().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(e) => {
            tracing::warn!("readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, format!("storage unreachable: {e}"))
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}
