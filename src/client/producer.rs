//! Partition-round-robin producer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::protocol::{MessageId, TopicName};

const MAX_PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct ProduceResponseBody {
    id: String,
}

/// Round-robins publishes to a topic's declared partitions.
pub struct Producer {
    base_url: String,
    http: reqwest::Client,
    max_partitions: u32,
    next_partition: AtomicUsize,
}

impl Producer {
    /// Build a producer against `base_url` (a broker or proxy base URL,
    /// with no trailing slash), spreading publishes round-robin over
    /// `[0, max_partitions)`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_partitions: u32) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            max_partitions,
            next_partition: AtomicUsize::new(0),
        }
    }

    /// Publish `payload` to `topic`, selecting the next partition in
    /// round-robin order. Retries transport and capacity errors up to
    /// [`MAX_PUBLISH_ATTEMPTS`] times with linear backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if every attempt fails.
    pub async fn publish(&self, topic: &TopicName, payload: String) -> Result<MessageId> {
        let partition = (self.next_partition.fetch_add(1, Ordering::Relaxed) as u32)
            % self.max_partitions;
        let url = format!(
            "{}/produce?topic={}&partition={}",
            self.base_url, topic, partition
        );

        let mut last_error = None;
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            match self.try_publish(&url, &payload).await {
                Ok(id) => return Ok(id),
                Err(err) => {
                    tracing::warn!(attempt, %err, topic = %topic, partition, "publish attempt failed");
                    last_error = Some(err);
                    if attempt < MAX_PUBLISH_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or(Error::Transport("publish exhausted retries".into())))
    }

    async fn try_publish(&self, url: &str, payload: &str) -> Result<MessageId> {
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "payload": payload }))
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        if response.status() == reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            return Err(Error::QueueFull);
        }
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "produce returned status {}",
                response.status()
            )));
        }

        let body: ProduceResponseBody = response
            .json()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;
        body.id
            .parse()
            .map_err(|_| Error::Transport(format!("malformed message id: {}", body.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps_at_max_partitions() {
        let producer = Producer::new("http://localhost:8080", 3);
        let picks: Vec<u32> = (0..7)
            .map(|_| {
                (producer.next_partition.fetch_add(1, Ordering::Relaxed) as u32)
                    % producer.max_partitions
            })
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
