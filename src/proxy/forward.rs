//! Forwards an inbound request to a chosen broker, preserving method,
//! headers, body, and (for `/consume`) the SSE framing unchanged.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use futures::TryStreamExt;

use crate::error::{Error, Result};

/// Build and execute an outgoing request to `broker_base + uri`, copying
/// `method`, `headers`, and `body` unchanged, then copy the response's
/// status, headers, and body back into an axum [`Response`].
///
/// For streaming bodies (the `/consume` SSE response), the response body
/// is re-streamed chunk by chunk rather than buffered, so framing is never
/// altered.
///
/// # Errors
///
/// Returns [`Error::Transport`] if the request cannot be built or the
/// connection fails.
pub async fn forward(
    client: &reqwest::Client,
    broker_base: &str,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(uri.path());
    let url = format!("{broker_base}{path_and_query}");

    let reqwest_method =
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);

    let mut request = client.request(reqwest_method, &url);
    for (name, value) in headers {
        if name == axum::http::header::HOST {
            continue;
        }
        request = request.header(name.as_str(), value.as_bytes());
    }
    if !body.is_empty() {
        request = request.body(body.to_vec());
    }

    let response = request
        .send()
        .await
        .map_err(|err| Error::Transport(err.to_string()))?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let stream = response
        .bytes_stream()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

    builder
        .body(Body::from_stream(stream))
        .map_err(|err| Error::Transport(err.to_string()))
}
