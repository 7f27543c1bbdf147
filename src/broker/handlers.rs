//! Axum HTTP handlers implementing the broker's `/produce`, `/consume`,
//! `/ack`, `/topics`, and `/health` endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::sse::Frame;
use crate::protocol::{ConsumerGroup, Message, MessageId, PartitionIndex, TopicName};

use super::partition::FetchOutcome;
use super::state::BrokerState;

/// Query parameters shared by `/produce`, `/consume`, and `/ack`.
#[derive(Debug, Deserialize)]
pub struct TopicPartitionQuery {
    topic: String,
    partition: PartitionIndex,
}

/// Query parameters for `/consume` and `/ack`, which additionally require a
/// consumer group.
#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    topic: String,
    partition: PartitionIndex,
    group: String,
}

#[derive(Debug, Serialize)]
struct ProduceResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct AckBody {
    id: String,
}

/// Decode a produce body as either raw bytes or `{"payload": "..."}`.
fn decode_payload(body: Bytes) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(&body) {
        if let Some(Value::String(payload)) = obj.get("payload") {
            return payload.clone();
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// `POST /produce?topic=...&partition=...`
///
/// # Errors
///
/// Returns [`Error::BadRequest`] for an unknown topic or partition,
/// [`Error::QueueFull`] if the partition's queue is saturated, or
/// [`Error::Io`] on a log append failure.
pub async fn produce(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<TopicPartitionQuery>,
    body: Bytes,
) -> Result<Json<ProduceResponse>> {
    let topic = TopicName::try_new(query.topic)
        .map_err(|err| Error::BadRequest(format!("invalid topic: {err}")))?;
    let partition = state
        .get_or_create_partition(topic.clone(), query.partition)
        .await?;

    let payload = decode_payload(body);
    let message = Message::new(topic, query.partition, payload);
    let id = message.id;
    partition.enqueue(message).await?;

    Ok(Json(ProduceResponse { id: id.to_string() }))
}

/// `GET /consume?topic=...&partition=...&group=...`
///
/// Streams SSE events exactly as framed by [`Frame::encode`]; never
/// buffers more than one delivered-but-unacked message ahead of what
/// `fetchAndTrack` has returned.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] for an invalid topic/group, or
/// [`Error::NotFound`] if the partition has never been produced to.
pub async fn consume(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<GroupQuery>,
) -> Result<Response> {
    let topic = TopicName::try_new(query.topic)
        .map_err(|err| Error::BadRequest(format!("invalid topic: {err}")))?;
    let group = ConsumerGroup::try_new(query.group)
        .map_err(|err| Error::BadRequest(format!("invalid group: {err}")))?;
    let partition = state.existing_partition(&topic, query.partition)?;
    let timeout = state.fetch_timeout();

    let body_stream = futures::stream::unfold(
        (partition, group, timeout),
        move |(partition, group, timeout)| async move {
            loop {
                match partition.fetch_and_track(group.clone(), timeout).await {
                    FetchOutcome::Delivered(message) => {
                        let frame = Frame::new(message);
                        let encoded = match frame.encode() {
                            Ok(encoded) => encoded,
                            Err(err) => {
                                tracing::error!(%err, "failed to encode SSE frame");
                                continue;
                            }
                        };
                        return Some((
                            std::result::Result::<Bytes, std::io::Error>::Ok(Bytes::from(
                                encoded,
                            )),
                            (partition, group, timeout),
                        ));
                    }
                    FetchOutcome::Empty => continue,
                    FetchOutcome::Closed => return None,
                }
            }
        },
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("static response parts are always valid");

    Ok(response)
}

/// `POST /ack?topic=...&partition=...&group=...`
///
/// # Errors
///
/// Returns [`Error::BadRequest`] for invalid query parameters or a
/// malformed id, [`Error::NotFound`] if the partition has never been
/// produced to, or [`Error::GroupMismatch`] if the id is unknown or
/// belongs to a different group.
pub async fn ack(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<GroupQuery>,
    Json(body): Json<AckBody>,
) -> Result<StatusCode> {
    let topic = TopicName::try_new(query.topic)
        .map_err(|err| Error::BadRequest(format!("invalid topic: {err}")))?;
    let group = ConsumerGroup::try_new(query.group)
        .map_err(|err| Error::BadRequest(format!("invalid group: {err}")))?;
    let id: MessageId = body
        .id
        .parse()
        .map_err(|_| Error::BadRequest(format!("invalid message id: {}", body.id)))?;

    let partition = state.existing_partition(&topic, query.partition)?;
    if partition.ack(id, &group) {
        Ok(StatusCode::OK)
    } else {
        Err(Error::GroupMismatch)
    }
}

/// `GET /topics`
pub async fn topics(State(state): State<Arc<BrokerState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.topics_snapshot()).unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    partitions_hosted: usize,
    total_queue_depth: usize,
    total_pending: usize,
}

/// `GET /health` — reports liveness plus aggregate queue-depth and
/// pending-ack-set totals across every hosted partition.
pub async fn health(State(state): State<Arc<BrokerState>>) -> impl IntoResponse {
    let totals = state.health_totals();
    Json(HealthResponse {
        status: "ok",
        partitions_hosted: totals.partitions_hosted,
        total_queue_depth: totals.total_queue_depth,
        total_pending: totals.total_pending,
    })
}
