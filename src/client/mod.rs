//! A small producer/consumer client for talking to a flowmq broker or
//! proxy over HTTP.

pub mod consumer;
pub mod producer;

pub use consumer::Consumer;
pub use producer::Producer;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::{ConsumerGroup, MessageId, TopicName};

/// Facade combining a [`Producer`] and [`Consumer`] against the same
/// `base_url`, for callers that want both without wiring two handles.
pub struct Client {
    producer: Producer,
    consumer: Consumer,
}

impl Client {
    /// Build a client against `base_url` (a broker or proxy base URL, no
    /// trailing slash) spread over `[0, max_partitions)`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_partitions: u32) -> Self {
        let base_url = base_url.into();
        Self {
            producer: Producer::new(base_url.clone(), max_partitions),
            consumer: Consumer::new(base_url, max_partitions),
        }
    }

    /// See [`Producer::publish`].
    ///
    /// # Errors
    ///
    /// Returns an error if every publish attempt fails.
    pub async fn publish(&self, topic: &TopicName, payload: String) -> Result<MessageId> {
        self.producer.publish(topic, payload).await
    }

    /// See [`Consumer::subscribe`].
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
        self.consumer
            .subscribe(topic, group, handler, shutdown)
            .await;
    }
}
