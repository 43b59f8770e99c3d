use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::errors::JobError;
use crate::jobs::{JobId, JobQueue, JobRequest, JobStore};

use super::ws;

pub struct AppState {
    pub queue: JobQueue,
}

impl AppState {
    pub fn store(&self) -> &JobStore {
        self.queue.store()
    }
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl From<&JobError> for FieldError {
    fn from(e: &JobError) -> Self {
        match e {
            JobError::InvalidInput { field, message } => Self {
                field: field.clone(),
                message: message.clone(),
            },
            other => Self {
                field: "request".to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub enum ApiError {
    Invalid(Vec<FieldError>),
    NotFound,
    Unavailable(Vec<FieldError>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(errors) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"success": false, "errors": errors})),
            )
                .into_response(),
            ApiError::Unavailable(errors) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"success": false, "errors": errors})),
            )
                .into_response(),
            ApiError::NotFound => (StatusCode::NOT_FOUND, Json(serde_json::json!({"status": "not_found"}))).into_response(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/create", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(ws::ws_handler))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_job(
    State(state): State<SharedState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::Invalid(vec![FieldError {
            field: "body".to_string(),
            message: rejection.body_text(),
        }])
    })?;
    let request = JobRequest::new(&request.repository_url, &request.instruction);

    match state.queue.submit(request).await {
        Ok(id) => Ok(Json(serde_json::json!({"success": true, "jobId": id}))),
        Err(errors) => {
            let invalid = errors.iter().all(|e| matches!(e, JobError::InvalidInput { .. }));
            let fields = errors.iter().map(FieldError::from).collect();
            if invalid {
                Err(ApiError::Invalid(fields))
            } else {
                Err(ApiError::Unavailable(fields))
            }
        }
    }
}

async fn get_job(State(state): State<SharedState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let id: JobId = id.parse().map_err(|_| ApiError::NotFound)?;
    let status = state.store().status(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(status))
}
