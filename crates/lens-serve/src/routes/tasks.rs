use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lens_core::gateway::{LookupStatus, TaskStatusView};
use serde::Deserialize;
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct StatusQuery {
    /// Seconds to wait for the task to finish before answering.
    wait_secs: Option<u64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/task-status/{task_id}", get(task_status))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/task-status/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task ID"),
        StatusQuery
    ),
    responses(
        (status = 200, body = TaskStatusView),
        (status = 404, body = TaskStatusView),
        (status = 503, body = TaskStatusView)
    )
)]
pub(crate) async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let wait = query
        .wait_secs
        .map(Duration::from_secs)
        .map(|wait| wait.min(state.max_wait))
        .filter(|wait| !wait.is_zero());
    let view = match wait {
        Some(wait) => state.gateway.wait_task_status(&task_id, wait).await,
        None => state.gateway.task_status(&task_id),
    };
    let status = match view.status {
        LookupStatus::NotFound => StatusCode::NOT_FOUND,
        LookupStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(view)).into_response()
}
