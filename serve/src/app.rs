//! Axum app: shared state and route table.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use config::EnvTag;
use switchboard::ThreadStore;
use tower_http::cors::CorsLayer;

use super::routes;

/// Shared state for the HTTP facade.
///
/// Injected into the router and cloned per request; handlers reach the
/// agent router and the thread store through it.
pub struct AppState {
    pub router: Arc<switchboard::Router>,
    pub store: Arc<dyn ThreadStore>,
    pub env: EnvTag,
}

/// Builds the route table over the shared state. CORS is wide open so
/// browser clients can reach `/stream` directly.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/invoke", post(routes::invoke))
        .route("/stream", post(routes::stream))
        .route("/nodes", get(routes::nodes))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
