pub mod middleware;
pub mod openapi;
pub mod routes;

#[cfg(test)]
mod testing;

use axum::Router;
use lens_core::Gateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Upper bound applied to `wait_secs` on status lookups.
    pub max_wait: Duration,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app(state)).await
}
