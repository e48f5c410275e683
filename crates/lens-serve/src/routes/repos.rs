use crate::AppState;
use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{ErrorEnvelope, map_error, map_rejection};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Extension, Json, Router};
use lens_core::AnalyzeOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RepoUrlInput {
    pub repo_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcceptedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_task_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvalidateResponse {
    pub invalidated: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/fetch-repo", post(fetch_repo))
        .route("/analyze", post(analyze))
        .route("/repo-cache", delete(invalidate_cache))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/fetch-repo",
    request_body = RepoUrlInput,
    responses(
        (status = 202, body = AcceptedResponse),
        (status = 400, body = ErrorEnvelope),
        (status = 422, body = ErrorEnvelope),
        (status = 503, body = ErrorEnvelope)
    )
)]
pub(crate) async fn fetch_repo(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    input: Result<Json<RepoUrlInput>, JsonRejection>,
) -> Response {
    let Json(input) = match input {
        Ok(input) => input,
        Err(rejection) => return map_rejection(&rejection, Some(correlation.0)).into_response(),
    };
    match state.gateway.fetch_repo(&input.repo_url) {
        Ok(task_id) => {
            info!(%task_id, repo_url = %input.repo_url, "fetch accepted");
            accepted(AcceptedResponse {
                task_id: Some(task_id.to_string()),
                fetch_task_id: None,
                message: "Repository fetch started.".to_string(),
            })
        }
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/analyze",
    request_body = RepoUrlInput,
    responses(
        (status = 202, body = AcceptedResponse),
        (status = 400, body = ErrorEnvelope),
        (status = 422, body = ErrorEnvelope),
        (status = 502, body = ErrorEnvelope),
        (status = 503, body = ErrorEnvelope)
    )
)]
pub(crate) async fn analyze(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    input: Result<Json<RepoUrlInput>, JsonRejection>,
) -> Response {
    let Json(input) = match input {
        Ok(input) => input,
        Err(rejection) => return map_rejection(&rejection, Some(correlation.0)).into_response(),
    };
    match state.gateway.analyze(&input.repo_url).await {
        Ok(AnalyzeOutcome::Started {
            analysis_task_id,
            fetch_task_id,
        }) => accepted(AcceptedResponse {
            task_id: Some(analysis_task_id.to_string()),
            fetch_task_id: Some(fetch_task_id.to_string()),
            message: "Analysis started.".to_string(),
        }),
        Ok(AnalyzeOutcome::StillInProgress { fetch_task_id }) => accepted(AcceptedResponse {
            task_id: None,
            fetch_task_id: Some(fetch_task_id.to_string()),
            message: "Repository fetch is still in progress. Check the fetch task and retry."
                .to_string(),
        }),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/repo-cache",
    request_body = RepoUrlInput,
    responses(
        (status = 200, body = InvalidateResponse),
        (status = 400, body = ErrorEnvelope),
        (status = 422, body = ErrorEnvelope),
        (status = 503, body = ErrorEnvelope)
    )
)]
pub(crate) async fn invalidate_cache(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    input: Result<Json<RepoUrlInput>, JsonRejection>,
) -> Response {
    let Json(input) = match input {
        Ok(input) => input,
        Err(rejection) => return map_rejection(&rejection, Some(correlation.0)).into_response(),
    };
    match state.gateway.invalidate(&input.repo_url) {
        Ok(invalidated) => Json(InvalidateResponse { invalidated }).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

fn accepted(body: AcceptedResponse) -> Response {
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use crate::app;
    use crate::testing::{body_json, broken_state, get_request, json_request, state};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn fetch_repo_accepts_and_returns_task_id() {
        let response = app(state())
            .oneshot(json_request(
                "POST",
                "/fetch-repo",
                &json!({"repo_url": "https://github.com/acme/widgets"}),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key("x-correlation-id"));
        let body = body_json(response).await;
        assert!(body["task_id"].as_str().expect("task id").starts_with("task_"));
        assert!(body.get("fetch_task_id").is_none());
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_with_envelope() {
        let response = app(state())
            .oneshot(
                json_request("POST", "/fetch-repo", &json!({"repo_url": "not a url"})),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_reference");
        assert!(body["correlation_id"].as_str().expect("corr").starts_with("corr_"));
    }

    #[tokio::test]
    async fn body_without_repo_url_is_rejected_with_envelope() {
        let response = app(state())
            .oneshot(json_request("POST", "/analyze", &json!({"url": "x"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .map(|value| value.as_bytes()),
            Some(&b"application/json"[..])
        );
        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_request");
        assert!(body["message"].as_str().expect("message").contains("repo_url"));
        assert!(body["correlation_id"].as_str().expect("corr").starts_with("corr_"));
        assert!(body.get("fetch_task_id").is_none());
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected_with_envelope() {
        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri("/repo-cache")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .expect("request");
        let response = app(state()).oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_request");
    }

    #[tokio::test]
    async fn caller_correlation_id_is_echoed() {
        let mut request = json_request("POST", "/analyze", &json!({"repo_url": "nope"}));
        request
            .headers_mut()
            .insert("x-correlation-id", "corr_caller".parse().expect("header"));
        let response = app(state()).oneshot(request).await.expect("response");

        assert_eq!(
            response.headers().get("x-correlation-id").map(|v| v.as_bytes()),
            Some(&b"corr_caller"[..])
        );
        let body = body_json(response).await;
        assert_eq!(body["correlation_id"], "corr_caller");
    }

    #[tokio::test]
    async fn analyze_runs_end_to_end() {
        let state = state();
        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                "/analyze",
                &json!({"repo_url": "https://host/acme/widgets"}),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert!(body["fetch_task_id"].is_string());
        let task_id = body["task_id"].as_str().expect("analysis task id").to_string();

        let view = state
            .gateway
            .wait_task_status(&task_id, Duration::from_secs(5))
            .await;
        let view = serde_json::to_value(view).expect("view json");
        assert_eq!(view["status"], "SUCCEEDED");
        assert_eq!(view["result"], json!({"text": "ok", "truncated": false}));
    }

    #[tokio::test]
    async fn analyze_of_missing_repository_is_bad_gateway() {
        let response = app(state())
            .oneshot(json_request(
                "POST",
                "/analyze",
                &json!({"repo_url": "https://github.com/acme/missing"}),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "fetch_failed");
        assert!(body["fetch_task_id"].as_str().expect("fetch id").starts_with("task_"));
    }

    #[tokio::test]
    async fn unavailable_backend_is_service_unavailable() {
        let response = app(broken_state())
            .oneshot(json_request(
                "POST",
                "/analyze",
                &json!({"repo_url": "https://github.com/acme/widgets"}),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "backend_unavailable");
    }

    #[tokio::test]
    async fn invalidate_reports_removed_snapshot() {
        let state = state();
        let url = "https://github.com/acme/widgets";
        let fetch = app(state.clone())
            .oneshot(json_request("POST", "/fetch-repo", &json!({"repo_url": url})))
            .await
            .expect("response");
        let task_id = body_json(fetch).await["task_id"]
            .as_str()
            .expect("task id")
            .to_string();
        state
            .gateway
            .wait_task_status(&task_id, Duration::from_secs(5))
            .await;

        let first = app(state.clone())
            .oneshot(json_request("DELETE", "/repo-cache", &json!({"repo_url": url})))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_json(first).await, json!({"invalidated": true}));

        let second = app(state)
            .oneshot(json_request("DELETE", "/repo-cache", &json!({"repo_url": url})))
            .await
            .expect("response");
        assert_eq!(body_json(second).await, json!({"invalidated": false}));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(state())
            .oneshot(get_request("/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }
}
