pub mod github;
pub mod openai;

pub use crate::github::{GitHubConfig, GitHubSource};
pub use crate::openai::{OpenAiClient, OpenAiConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

pub(crate) const USER_AGENT: &str = concat!("repolens/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base url.
    pub async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }
}
