//! Per-partition subscription tasks: SSE read, parse, dispatch, ack.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::sse::Scanner;
use crate::protocol::{ConsumerGroup, Message, MessageId, TopicName};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);
const MAX_ACK_ATTEMPTS: u32 = 2;

/// Consumes one topic across all of its declared partitions, dispatching
/// each delivered message to a handler and acking on success.
pub struct Consumer {
    base_url: String,
    http: reqwest::Client,
    max_partitions: u32,
}

impl Consumer {
    /// Build a consumer against `base_url`, ready to subscribe across
    /// `[0, max_partitions)`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_partitions: u32) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            max_partitions,
        }
    }

    /// Spawn one task per partition, each independently long-polling
    /// `/consume`, parsing SSE frames, invoking `handler`, and acking on
    /// success. Runs until every task observes `shutdown` cancelled.
    ///
    /// `handler` receives the decoded topic, payload, and message id; an
    /// `Err` return skips the ack so the message redelivers after its
    /// visibility timeout.
    pub async fn subscribe<F, Fut>(
        &self,
        topic: TopicName,
        group: ConsumerGroup,
        handler: F,
        shutdown: CancellationToken,
    ) where
        F: Fn(TopicName, String, MessageId) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for partition in 0..self.max_partitions {
            let base_url = self.base_url.clone();
            let http = self.http.clone();
            let topic = topic.clone();
            let group = group.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                run_partition(base_url, http, topic, partition, group, handler, shutdown).await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

async fn run_partition<F, Fut>(
    base_url: String,
    http: reqwest::Client,
    topic: TopicName,
    partition: u32,
    group: ConsumerGroup,
    handler: F,
    shutdown: CancellationToken,
) where
    F: Fn(TopicName, String, MessageId) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut backoff = RECONNECT_BACKOFF;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let url = format!(
            "{}/consume?topic={}&partition={}&group={}",
            base_url, topic, partition, group
        );

        let response = tokio::select! {
            () = shutdown.cancelled() => return,
            result = http.get(&url).send() => result,
        };

        match response {
            Ok(resp) if resp.status().is_success() => {
                backoff = RECONNECT_BACKOFF;
                drain_stream(
                    &http, &base_url, &topic, partition, &group, resp, &handler, &shutdown,
                )
                .await;
            }
            Ok(resp) => {
                tracing::warn!(topic = %topic, partition, status = %resp.status(), "consume request rejected");
            }
            Err(err) => {
                tracing::warn!(topic = %topic, partition, %err, "consume request failed");
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
    }
}

#[allow(clippy::too_many_arguments)]
async fn drain_stream<F, Fut>(
    http: &reqwest::Client,
    base_url: &str,
    topic: &TopicName,
    partition: u32,
    group: &ConsumerGroup,
    response: reqwest::Response,
    handler: &F,
    shutdown: &CancellationToken,
) where
    F: Fn(TopicName, String, MessageId) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut stream = response.bytes_stream();
    let mut scanner = Scanner::new();

    loop {
        let chunk = tokio::select! {
            () = shutdown.cancelled() => return,
            chunk = stream.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                tracing::warn!(topic = %topic, partition, %err, "consume stream error");
                return;
            }
            None => return,
        };

        scanner.push(&bytes);
        while let Some(message) = scanner.next_frame() {
            dispatch(http, base_url, topic, partition, group, message, handler).await;
        }
    }
}

async fn dispatch<F, Fut>(
    http: &reqwest::Client,
    base_url: &str,
    topic: &TopicName,
    partition: u32,
    group: &ConsumerGroup,
    message: Message,
    handler: &F,
) where
    F: Fn(TopicName, String, MessageId) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let id = message.id;
    match handler(message.topic, message.payload, id).await {
        Ok(()) => {
            if let Err(err) = ack(http, base_url, topic, partition, group, id).await {
                tracing::warn!(%id, %err, "ack failed after successful handler");
            }
        }
        Err(err) => {
            tracing::warn!(%id, %err, "handler failed, leaving message for redelivery");
        }
    }
}

async fn ack(
    http: &reqwest::Client,
    base_url: &str,
    topic: &TopicName,
    partition: u32,
    group: &ConsumerGroup,
    id: MessageId,
) -> Result<()> {
    let url = format!(
        "{}/ack?topic={}&partition={}&group={}",
        base_url, topic, partition, group
    );

    let mut last_error = None;
    for attempt in 1..=MAX_ACK_ATTEMPTS {
        match http
            .post(&url)
            .json(&serde_json::json!({ "id": id }))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => last_error = Some(Error::Transport(format!("ack status {}", resp.status()))),
            Err(err) => last_error = Some(Error::Transport(err.to_string())),
        }
        if attempt < MAX_ACK_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    Err(last_error.unwrap_or(Error::Transport("ack exhausted retries".into())))
}
