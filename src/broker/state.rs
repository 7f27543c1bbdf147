//! Broker-wide state: the topic table and the lazily-created partition map.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{BrokerConfig, TopicTable};
use crate::error::{Error, Result};
use crate::protocol::{PartitionIndex, TopicName};

use super::partition::{spawn_monitor, Partition};

/// A partition's current queue depth and pending-ack-set size, reported by
/// `/topics` and aggregated into `/health`.
#[derive(Debug, Serialize)]
pub struct PartitionInfo {
    /// The partition's index within its topic.
    pub index: PartitionIndex,
    /// Messages enqueued but not yet delivered to a consumer.
    pub queue_depth: usize,
    /// Messages delivered but not yet acked.
    pub pending: usize,
}

/// Broker-wide totals across every hosted partition, for `/health`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthTotals {
    /// Number of partitions this broker has lazily created.
    pub partitions_hosted: usize,
    /// Sum of every hosted partition's queue depth.
    pub total_queue_depth: usize,
    /// Sum of every hosted partition's pending-ack-set size.
    pub total_pending: usize,
}

/// Shared state behind every broker HTTP handler.
pub struct BrokerState {
    topics: TopicTable,
    partitions: DashMap<(TopicName, PartitionIndex), Arc<Partition>>,
    /// Guards the lazy-creation check-then-create race (spec §9: "Partition
    /// creation race").
    create_lock: Mutex<()>,
    storage_dir: PathBuf,
    queue_size: usize,
    visibility_timeout: Duration,
    fetch_timeout: Duration,
    monitor_period: Duration,
}

impl BrokerState {
    /// Build broker state from `config`. Does not create any partitions —
    /// those are created lazily by the first `/produce` that addresses
    /// them.
    #[must_use]
    pub fn new(config: &BrokerConfig, topics: TopicTable) -> Self {
        let visibility_timeout = config.visibility_timeout();
        Self {
            topics,
            partitions: DashMap::new(),
            create_lock: Mutex::new(()),
            storage_dir: PathBuf::from(&config.storage_dir),
            queue_size: config.queue_size,
            visibility_timeout,
            fetch_timeout: config.fetch_timeout(),
            monitor_period: visibility_timeout / 2,
        }
    }

    /// The bounded wait for a single `fetchAndTrack` poll.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// The declared partition count for `topic`, if known.
    #[must_use]
    pub fn declared_partitions(&self, topic: &TopicName) -> Option<u32> {
        self.topics.get(topic).copied()
    }

    /// All topics this broker knows about, paired with introspection
    /// (queue depth, pending count) for each partition it currently hosts
    /// (i.e. has lazily created).
    #[must_use]
    pub fn topics_snapshot(&self) -> std::collections::HashMap<String, Vec<PartitionInfo>> {
        let mut out: std::collections::HashMap<String, Vec<PartitionInfo>> =
            self.topics.keys().map(|t| (t.to_string(), Vec::new())).collect();
        for entry in &self.partitions {
            let (topic, index) = entry.key();
            let partition = entry.value();
            out.entry(topic.to_string()).or_default().push(PartitionInfo {
                index: *index,
                queue_depth: partition.len(),
                pending: partition.pending_len(),
            });
        }
        for infos in out.values_mut() {
            infos.sort_unstable_by_key(|info| info.index);
        }
        out
    }

    /// Broker-wide totals across every hosted partition, for `/health`.
    #[must_use]
    pub fn health_totals(&self) -> HealthTotals {
        let mut totals = HealthTotals::default();
        for entry in &self.partitions {
            let partition = entry.value();
            totals.partitions_hosted += 1;
            totals.total_queue_depth += partition.len();
            totals.total_pending += partition.pending_len();
        }
        totals
    }

    /// Get or lazily create the partition at `(topic, index)`. Fails if the
    /// topic is unknown or `index` is outside the topic's declared range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an unknown topic or out-of-range
    /// index, or [`Error::Io`] if the partition's log file cannot be
    /// created.
    pub async fn get_or_create_partition(
        &self,
        topic: TopicName,
        index: PartitionIndex,
    ) -> Result<Arc<Partition>> {
        let declared = self
            .declared_partitions(&topic)
            .ok_or_else(|| Error::BadRequest(format!("unknown topic: {topic}")))?;
        if index >= declared {
            return Err(Error::BadRequest(format!(
                "partition {index} out of range for topic {topic} (declared {declared})"
            )));
        }

        let key = (topic.clone(), index);
        if let Some(existing) = self.partitions.get(&key) {
            return Ok(existing.clone());
        }

        // Double-checked: only one task wins the race to create.
        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.partitions.get(&key) {
            return Ok(existing.clone());
        }

        let partition = Arc::new(
            Partition::open(
                &self.storage_dir,
                topic.clone(),
                index,
                self.queue_size,
                self.visibility_timeout,
            )
            .await?,
        );
        spawn_monitor(partition.clone(), self.monitor_period);
        self.partitions.insert(key, partition.clone());
        Ok(partition)
    }

    /// Look up an already-created partition without creating it. Used by
    /// `/consume` and `/ack`, which must fail on a partition that has never
    /// been produced to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the partition has never been created.
    pub fn existing_partition(
        &self,
        topic: &TopicName,
        index: PartitionIndex,
    ) -> Result<Arc<Partition>> {
        self.partitions
            .get(&(topic.clone(), index))
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound(format!("partition {topic}-{index} does not exist")))
    }

    /// Signal every hosted partition's monitor and any in-flight
    /// `fetchAndTrack` waiters to stop, for graceful shutdown.
    pub fn shutdown(&self) {
        for entry in &self.partitions {
            entry.value().shutdown();
        }
    }
}
