use utoipa::OpenApi;

use crate::routes::error::ErrorEnvelope;
use crate::routes::health::HealthResponse;
use crate::routes::repos::{AcceptedResponse, InvalidateResponse, RepoUrlInput};
use crate::routes::tasks::StatusQuery;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lens_core::gateway::{LookupStatus, TaskResultView, TaskStatusView};
use lens_core::types::{
    AnalysisResult, RepoReference, Snapshot, TaskFailure, TaskKind, TaskOutput, TaskStatus,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "repolens", description = "Repository fetch and analysis service"),
    paths(
        crate::routes::repos::fetch_repo,
        crate::routes::repos::analyze,
        crate::routes::repos::invalidate_cache,
        crate::routes::tasks::task_status,
        crate::routes::health::health,
    ),
    components(schemas(
        RepoUrlInput,
        AcceptedResponse,
        InvalidateResponse,
        ErrorEnvelope,
        HealthResponse,
        StatusQuery,
        TaskStatusView,
        TaskResultView,
        LookupStatus,
        TaskOutput,
        TaskFailure,
        TaskKind,
        TaskStatus,
        Snapshot,
        AnalysisResult,
        RepoReference
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
