//! Axum handlers that route inbound requests to a backend broker.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::error::Result;

use super::forward::forward;
use super::ring::partition_key;
use super::stats::RequestKind;
use super::state::ProxyState;

/// Query parameters carried by produce/consume/ack, used only to compute
/// the routing key; the full original query string is still forwarded
/// unchanged to the chosen broker.
#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    topic: String,
    partition: u32,
}

async fn route_and_forward(
    state: &ProxyState,
    kind: RequestKind,
    key: &str,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let broker = state.topology.route(key)?;
    state.stats.record_attempt(kind, &broker);
    let started = Instant::now();

    let result = forward(&state.http, &broker, method, &uri, &headers, body).await;

    state
        .stats
        .record_result(kind, &broker, result.is_ok(), started.elapsed());
    result
}

/// `POST /produce?topic=...&partition=...`
pub async fn produce(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<RouteQuery>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let key = partition_key(&query.topic, query.partition);
    route_and_forward(&state, RequestKind::Produce, &key, method, uri, headers, body).await
}

/// `GET /consume?topic=...&partition=...&group=...`
pub async fn consume(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<RouteQuery>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
) -> Result<Response> {
    let key = partition_key(&query.topic, query.partition);
    route_and_forward(
        &state,
        RequestKind::Consume,
        &key,
        method,
        uri,
        headers,
        Bytes::new(),
    )
    .await
}

/// `POST /ack?topic=...&partition=...&group=...`
pub async fn ack(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<RouteQuery>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let key = partition_key(&query.topic, query.partition);
    route_and_forward(&state, RequestKind::Ack, &key, method, uri, headers, body).await
}

/// `GET /topics` — fans out to any currently healthy broker.
pub async fn topics(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
) -> Result<Response> {
    let broker = state.topology.any_healthy()?;
    state.stats.record_attempt(RequestKind::Other, &broker);
    let started = Instant::now();
    let result = forward(&state.http, &broker, method, &uri, &headers, Bytes::new()).await;
    state
        .stats
        .record_result(RequestKind::Other, &broker, result.is_ok(), started.elapsed());
    result
}

/// `GET /health` — fans out to any currently healthy broker, same as
/// `/topics`, but does not require a `topic`/`partition` query.
pub async fn health(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
) -> Result<Response> {
    let broker = state.topology.any_healthy()?;
    state.stats.record_attempt(RequestKind::Other, &broker);
    let started = Instant::now();
    let result = forward(&state.http, &broker, method, &uri, &headers, Bytes::new()).await;
    state
        .stats
        .record_result(RequestKind::Other, &broker, result.is_ok(), started.elapsed());
    result
}

/// `GET /stats` — this proxy's own request/latency/health-transition
/// counters.
pub async fn stats(State(state): State<Arc<ProxyState>>) -> Json<serde_json::Value> {
    Json(state.stats.snapshot())
}

/// `GET /metrics` — Prometheus-style text exposition of the same
/// counters.
pub async fn metrics(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.stats.render_prometheus(),
    )
}
