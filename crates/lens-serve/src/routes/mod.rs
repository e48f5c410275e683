pub mod error;
pub mod health;
pub mod repos;
pub mod tasks;

use crate::middleware::correlation::correlation_middleware;
use crate::{AppState, openapi};
use axum::Router;
use axum::middleware;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(repos::router(state.clone()))
        .merge(tasks::router(state))
        .merge(health::router())
        .merge(openapi::router())
        .route_layer(middleware::from_fn(correlation_middleware))
}
