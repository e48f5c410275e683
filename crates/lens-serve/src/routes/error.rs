use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use lens_core::LensError;
use lens_core::error::{FetchError, InferenceError, StoreError, TaskError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_task_id: Option<String>,
}

pub fn map_error(
    err: &LensError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code) = match err {
        LensError::Reference(_) => (StatusCode::BAD_REQUEST, "invalid_reference"),
        LensError::Fetch(fetch) => map_fetch_error(fetch),
        LensError::Inference(inference) => map_inference_error(inference),
        LensError::Store(store) => map_store_error(store),
        LensError::Task(task) => map_task_error(task),
        LensError::FetchFailedAfterRetries { .. } => (StatusCode::BAD_GATEWAY, "fetch_failed"),
        LensError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    let fetch_task_id = match err {
        LensError::FetchFailedAfterRetries { fetch_task_id, .. } => Some(fetch_task_id.clone()),
        _ => None,
    };

    (
        status,
        Json(ErrorEnvelope {
            code: code.to_string(),
            message: err.to_string(),
            correlation_id,
            fetch_task_id,
        }),
    )
}

/// Request bodies axum could not parse still answer with the envelope.
pub fn map_rejection(
    rejection: &JsonRejection,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        rejection.status(),
        Json(ErrorEnvelope {
            code: "invalid_request".to_string(),
            message: rejection.body_text(),
            correlation_id,
            fetch_task_id: None,
        }),
    )
}

fn map_fetch_error(err: &FetchError) -> (StatusCode, &'static str) {
    match err {
        FetchError::InvalidReference(_) => (StatusCode::BAD_REQUEST, "invalid_reference"),
        _ => (StatusCode::BAD_GATEWAY, err.code()),
    }
}

fn map_inference_error(err: &InferenceError) -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, err.code())
}

fn map_store_error(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable"),
        StoreError::Codec { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn map_task_error(err: &TaskError) -> (StatusCode, &'static str) {
    match err {
        TaskError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        TaskError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_state"),
        TaskError::Store(store) => map_store_error(store),
    }
}
