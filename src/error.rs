//! Error types shared across the broker, proxy, and client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Top-level error type for flowmq operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required query parameter or body field was missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The referenced topic or partition has never been created.
    #[error("not found: {0}")]
    NotFound(String),

    /// The partition's in-memory queue was at capacity.
    #[error("queue full")]
    QueueFull,

    /// An ack was presented by a consumer group other than the one a
    /// message was dispatched to.
    #[error("group mismatch")]
    GroupMismatch,

    /// Forwarding a request to a backend broker failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No healthy broker was available to serve a request.
    #[error("no healthy broker available")]
    NoHealthyBroker,

    /// An I/O failure, most commonly a partition log append.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A message or request body failed to (de)serialize as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::BadRequest(_) | Error::NotFound(_) | Error::GroupMismatch => {
                StatusCode::BAD_REQUEST
            }
            Error::QueueFull | Error::Io(_) | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Transport(_) | Error::NoHealthyBroker => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
