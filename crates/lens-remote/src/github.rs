use crate::{ClientBuildError, USER_AGENT};
use async_trait::async_trait;
use lens_core::error::FetchError;
use lens_core::source::{EntryKind, ListingEntry, RepoSource};
use lens_core::types::RepoReference;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Reads the top-level contents listing of a repository through the GitHub
/// REST API and downloads files from their raw urls.
pub struct GitHubSource {
    client: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

impl From<ContentEntry> for ListingEntry {
    fn from(value: ContentEntry) -> Self {
        let kind = match value.kind.as_str() {
            "file" => EntryKind::File,
            "dir" => EntryKind::Dir,
            _ => EntryKind::Other,
        };
        Self {
            path: value.path,
            kind,
            download_url: value.download_url,
        }
    }
}

impl GitHubSource {
    pub fn new(config: GitHubConfig) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.filter(|token| !token.is_empty()),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| FetchError::Transport {
                reason: err.to_string(),
            })?;
        check_status(response.status())?;
        Ok(response)
    }
}

fn check_status(status: StatusCode) -> Result<(), FetchError> {
    match status {
        ok if ok.is_success() => Ok(()),
        StatusCode::FORBIDDEN => Err(FetchError::RateLimited),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound),
        other => Err(FetchError::UnexpectedStatus {
            status: other.as_u16(),
        }),
    }
}

#[async_trait]
impl RepoSource for GitHubSource {
    async fn list(&self, reference: &RepoReference) -> Result<Vec<ListingEntry>, FetchError> {
        let url = format!(
            "{}/repos/{}/{}/contents",
            self.api_url, reference.owner, reference.name
        );
        debug!(%url, "listing repository contents");
        let request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        let response = self.send(request).await?;
        let entries: Vec<ContentEntry> =
            response
                .json()
                .await
                .map_err(|err| FetchError::InvalidListing {
                    reason: err.to_string(),
                })?;
        Ok(entries.into_iter().map(ListingEntry::from).collect())
    }

    async fn fetch_file(&self, entry: &ListingEntry) -> Result<String, FetchError> {
        let Some(url) = entry.download_url.as_deref() else {
            return Err(FetchError::InvalidListing {
                reason: format!("{} has no download url", entry.path),
            });
        };
        debug!(%url, path = %entry.path, "downloading file");
        let response = self.send(self.client.get(url)).await?;
        response.text().await.map_err(|err| FetchError::Transport {
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::json;

    fn reference() -> RepoReference {
        RepoReference::new("octo", "demo").expect("reference")
    }

    fn source(base: &str, token: Option<&str>) -> GitHubSource {
        GitHubSource::new(GitHubConfig {
            api_url: base.to_string(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn list_maps_entry_types_and_download_urls() {
        let router = Router::new().route(
            "/repos/octo/demo/contents",
            get(|| async {
                axum::Json(json!([
                    {"path": "README.md", "type": "file", "download_url": "http://raw/README.md"},
                    {"path": "src", "type": "dir", "download_url": null},
                    {"path": "vendor", "type": "submodule", "download_url": null}
                ]))
            }),
        );
        let base = spawn(router).await;

        let entries = source(&base, None).list(&reference()).await.expect("list");
        assert_eq!(
            entries,
            vec![
                ListingEntry::file("README.md", "http://raw/README.md"),
                ListingEntry::dir("src"),
                ListingEntry {
                    path: "vendor".to_string(),
                    kind: EntryKind::Other,
                    download_url: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn list_sends_bearer_token_when_configured() {
        let router = Router::new().route(
            "/repos/octo/demo/contents",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer secret" {
                    axum::Json(json!([])).into_response()
                } else {
                    axum::http::StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
        let base = spawn(router).await;

        let entries = source(&base, Some("secret"))
            .list(&reference())
            .await
            .expect("list");
        assert!(entries.is_empty());

        let err = source(&base, None).list(&reference()).await.expect_err("no token");
        assert_eq!(err, FetchError::UnexpectedStatus { status: 401 });
    }

    #[tokio::test]
    async fn list_maps_forbidden_and_not_found() {
        let router = Router::new()
            .route(
                "/repos/octo/demo/contents",
                get(|| async { axum::http::StatusCode::FORBIDDEN }),
            )
            .route(
                "/repos/octo/gone/contents",
                get(|| async { axum::http::StatusCode::NOT_FOUND }),
            );
        let base = spawn(router).await;
        let client = source(&base, None);

        assert_eq!(
            client.list(&reference()).await,
            Err(FetchError::RateLimited)
        );
        let gone = RepoReference::new("octo", "gone").expect("reference");
        assert_eq!(client.list(&gone).await, Err(FetchError::NotFound));
    }

    #[tokio::test]
    async fn list_rejects_non_array_body() {
        let router = Router::new().route(
            "/repos/octo/demo/contents",
            get(|| async { axum::Json(json!({"message": "single file"})) }),
        );
        let base = spawn(router).await;

        let err = source(&base, None).list(&reference()).await.expect_err("object");
        assert!(matches!(err, FetchError::InvalidListing { .. }));
    }

    #[tokio::test]
    async fn fetch_file_returns_body_or_status_error() {
        let router = Router::new()
            .route("/raw/ok.txt", get(|| async { "file body" }))
            .route(
                "/raw/missing.txt",
                get(|| async { axum::http::StatusCode::NOT_FOUND }),
            );
        let base = spawn(router).await;
        let client = source(&base, None);

        let ok = ListingEntry::file("ok.txt", &format!("{base}/raw/ok.txt"));
        assert_eq!(client.fetch_file(&ok).await, Ok("file body".to_string()));

        let missing = ListingEntry::file("missing.txt", &format!("{base}/raw/missing.txt"));
        assert_eq!(client.fetch_file(&missing).await, Err(FetchError::NotFound));
    }

    #[tokio::test]
    async fn any_success_status_is_accepted() {
        let router = Router::new()
            .route(
                "/repos/octo/demo/contents",
                get(|| async {
                    (
                        axum::http::StatusCode::NON_AUTHORITATIVE_INFORMATION,
                        axum::Json(json!([
                            {"path": "a.rs", "type": "file", "download_url": "http://raw/a.rs"}
                        ])),
                    )
                }),
            )
            .route(
                "/raw/proxied.txt",
                get(|| async { (axum::http::StatusCode::NON_AUTHORITATIVE_INFORMATION, "via proxy") }),
            );
        let base = spawn(router).await;
        let client = source(&base, None);

        let entries = client.list(&reference()).await.expect("list");
        assert_eq!(entries, vec![ListingEntry::file("a.rs", "http://raw/a.rs")]);

        let proxied = ListingEntry::file("proxied.txt", &format!("{base}/raw/proxied.txt"));
        assert_eq!(client.fetch_file(&proxied).await, Ok("via proxy".to_string()));
    }

    #[tokio::test]
    async fn fetch_file_without_download_url_is_invalid() {
        let client = source("http://127.0.0.1:9", None);
        let err = client
            .fetch_file(&ListingEntry::dir("src"))
            .await
            .expect_err("dir");
        assert!(matches!(err, FetchError::InvalidListing { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = source("http://127.0.0.1:9", None);
        let err = client.list(&reference()).await.expect_err("unreachable");
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
