//! Assembles the broker's axum [`Router`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::BrokerState;

/// Build the broker's HTTP router over shared [`BrokerState`].
#[must_use]
pub fn create_router(state: Arc<BrokerState>) -> Router {
    Router::new()
        .route("/produce", post(handlers::produce))
        .route("/consume", get(handlers::consume))
        .route("/ack", post(handlers::ack))
        .route("/topics", get(handlers::topics))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
