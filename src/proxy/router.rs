//! Assembles the proxy's axum [`Router`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::ProxyState;

/// Build the proxy's HTTP router over shared [`ProxyState`].
#[must_use]
pub fn create_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/produce", post(handlers::produce))
        .route("/consume", get(handlers::consume))
        .route("/ack", post(handlers::ack))
        .route("/topics", get(handlers::topics))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
