//! A single partition: bounded in-memory queue, append-only log, pending
//! set, and the background monitor that redelivers on visibility-timeout
//! expiry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{ConsumerGroup, Message, MessageId, PartitionIndex, TopicName};

/// A message delivered to a consumer but not yet acked.
#[derive(Debug, Clone)]
struct PendingRecord {
    message: Message,
    deadline: Instant,
    group: ConsumerGroup,
}

/// The result of a single `fetchAndTrack` poll.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A message was dequeued and is now pending ack.
    Delivered(Message),
    /// The bounded wait elapsed with nothing to deliver.
    Empty,
    /// The partition is shutting down; callers should stop polling.
    Closed,
}

/// One partition of one topic: a FIFO queue, its log file, and its pending
/// set.
pub struct Partition {
    topic: TopicName,
    index: PartitionIndex,
    queue_tx: mpsc::Sender<Message>,
    queue_rx: Mutex<mpsc::Receiver<Message>>,
    queue_len: AtomicUsize,
    pending: DashMap<MessageId, PendingRecord>,
    log: Mutex<tokio::fs::File>,
    visibility_timeout: Duration,
    shutdown: CancellationToken,
}

impl Partition {
    /// Open (creating if absent) the log file at
    /// `<storage_dir>/<topic>/partition-<index>.log` and construct a fresh,
    /// empty-queue partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic's storage directory or the log file
    /// cannot be created.
    pub async fn open(
        storage_dir: &PathBuf,
        topic: TopicName,
        index: PartitionIndex,
        queue_capacity: usize,
        visibility_timeout: Duration,
    ) -> Result<Self> {
        let dir = storage_dir.join(topic.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("partition-{index}.log"));
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);

        Ok(Self {
            topic,
            index,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            queue_len: AtomicUsize::new(0),
            pending: DashMap::new(),
            log: Mutex::new(log),
            visibility_timeout,
            shutdown: CancellationToken::new(),
        })
    }

    /// The topic this partition belongs to.
    #[must_use]
    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// This partition's index within its topic.
    #[must_use]
    pub fn index(&self) -> PartitionIndex {
        self.index
    }

    /// Current number of messages pending ack.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Current depth of the in-memory queue (messages enqueued but not yet
    /// delivered to a consumer), for `/topics` and `/health` introspection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Is the in-memory queue currently empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `message` to the log, then attempt a non-blocking push onto
    /// the in-memory queue.
    ///
    /// If the log append fails, the message is not enqueued and the error
    /// propagates. If the append succeeds but the queue is full, returns
    /// [`Error::QueueFull`] — the log line is now an orphaned record, which
    /// is the accepted failure mode documented in the spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on log append failure, [`Error::QueueFull`] if
    /// the in-memory queue has no capacity.
    pub async fn enqueue(&self, message: Message) -> Result<()> {
        let line = serde_json::to_string(&message)?;
        {
            let mut log = self.log.lock().await;
            log.write_all(line.as_bytes()).await?;
            log.write_all(b"\n").await?;
        }

        self.queue_tx
            .try_send(message)
            .map_err(|_| Error::QueueFull)?;
        self.queue_len.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait up to `timeout` for a message, recording it in the pending set
    /// on receipt.
    pub async fn fetch_and_track(&self, group: ConsumerGroup, timeout: Duration) -> FetchOutcome {
        let mut rx = self.queue_rx.lock().await;

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => FetchOutcome::Closed,
            result = tokio::time::timeout(timeout, rx.recv()) => match result {
                Ok(Some(message)) => {
                    self.queue_len.fetch_sub(1, Ordering::Relaxed);
                    self.pending.insert(
                        message.id,
                        PendingRecord {
                            message: message.clone(),
                            deadline: Instant::now() + self.visibility_timeout,
                            group,
                        },
                    );
                    FetchOutcome::Delivered(message)
                }
                Ok(None) => FetchOutcome::Closed,
                Err(_elapsed) => FetchOutcome::Empty,
            },
        }
    }

    /// Acknowledge `id` on behalf of `group`. Returns `true` only if the id
    /// was pending and the recorded group matches; the mismatch case is a
    /// no-op (the pending-record remains and expires normally).
    #[must_use]
    pub fn ack(&self, id: MessageId, group: &ConsumerGroup) -> bool {
        let Some(entry) = self.pending.get(&id) else {
            return false;
        };
        if entry.group != *group {
            return false;
        }
        drop(entry);
        self.pending.remove(&id);
        true
    }

    /// Scan the pending set for expired deadlines, removing each and
    /// attempting a non-blocking requeue. Called periodically by the
    /// monitor task; never blocks.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            let Some((_, record)) = self.pending.remove(&id) else {
                continue;
            };
            if self.queue_tx.try_send(record.message).is_err() {
                tracing::warn!(
                    topic = %self.topic,
                    partition = self.index,
                    message_id = %id,
                    "dropping message from memory: requeue into full queue"
                );
            } else {
                self.queue_len.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    topic = %self.topic,
                    partition = self.index,
                    message_id = %id,
                    "requeued message after visibility timeout expired"
                );
            }
        }
    }

    /// Wake any in-flight `fetch_and_track` waiter with a terminal
    /// [`FetchOutcome::Closed`], used on broker shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Spawn the background monitor task for `partition`, scanning at `period`
/// (the spec recommends `period <= visibility_timeout / 2`).
pub fn spawn_monitor(partition: Arc<Partition>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = partition.shutdown.cancelled() => return,
                _ = ticker.tick() => partition.sweep_expired(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TopicName;

    async fn open_test_partition(capacity: usize, visibility: Duration) -> (Partition, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(
            &dir.path().to_path_buf(),
            TopicName::try_new("events").unwrap(),
            0,
            capacity,
            visibility,
        )
        .await
        .unwrap();
        (partition, dir)
    }

    #[tokio::test]
    async fn queue_depth_tracks_enqueue_fetch_and_requeue() {
        let (partition, _dir) = open_test_partition(10, Duration::from_millis(20)).await;
        assert!(partition.is_empty());

        let msg = Message::new(TopicName::try_new("events").unwrap(), 0, "a".into());
        partition.enqueue(msg).await.unwrap();
        assert_eq!(partition.len(), 1);

        let group = ConsumerGroup::try_new("g").unwrap();
        let FetchOutcome::Delivered(_) =
            partition.fetch_and_track(group, Duration::from_millis(100)).await
        else {
            panic!("expected delivery");
        };
        assert!(partition.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        partition.sweep_expired();
        assert_eq!(partition.len(), 1, "expired message should be requeued");
    }

    #[tokio::test]
    async fn enqueue_then_fetch_round_trips() {
        let (partition, _dir) = open_test_partition(10, Duration::from_secs(30)).await;
        let msg = Message::new(TopicName::try_new("events").unwrap(), 0, "a".into());
        partition.enqueue(msg.clone()).await.unwrap();

        let group = ConsumerGroup::try_new("g").unwrap();
        match partition.fetch_and_track(group, Duration::from_millis(100)).await {
            FetchOutcome::Delivered(delivered) => assert_eq!(delivered, msg),
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_times_out_on_empty_queue() {
        let (partition, _dir) = open_test_partition(10, Duration::from_secs(30)).await;
        let group = ConsumerGroup::try_new("g").unwrap();
        match partition
            .fetch_and_track(group, Duration::from_millis(50))
            .await
        {
            FetchOutcome::Empty => (),
            other => panic!("expected empty, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enqueue_fails_when_queue_full() {
        let (partition, _dir) = open_test_partition(1, Duration::from_secs(30)).await;
        let msg = |p| Message::new(TopicName::try_new("events").unwrap(), 0, p);
        partition.enqueue(msg("a".into())).await.unwrap();
        let err = partition.enqueue(msg("b".into())).await.unwrap_err();
        assert!(matches!(err, Error::QueueFull));
    }

    #[tokio::test]
    async fn ack_requires_matching_group() {
        let (partition, _dir) = open_test_partition(10, Duration::from_secs(30)).await;
        let msg = Message::new(TopicName::try_new("events").unwrap(), 0, "a".into());
        partition.enqueue(msg.clone()).await.unwrap();

        let g1 = ConsumerGroup::try_new("g1").unwrap();
        let g2 = ConsumerGroup::try_new("g2").unwrap();
        let FetchOutcome::Delivered(delivered) =
            partition.fetch_and_track(g1.clone(), Duration::from_millis(100)).await
        else {
            panic!("expected delivery");
        };

        assert!(!partition.ack(delivered.id, &g2));
        assert_eq!(partition.pending_len(), 1);
        assert!(partition.ack(delivered.id, &g1));
        assert_eq!(partition.pending_len(), 0);
        assert!(!partition.ack(delivered.id, &g1));
    }

    #[tokio::test]
    async fn expired_pending_message_is_requeued() {
        let (partition, _dir) = open_test_partition(10, Duration::from_millis(20)).await;
        let msg = Message::new(TopicName::try_new("events").unwrap(), 0, "a".into());
        partition.enqueue(msg.clone()).await.unwrap();

        let group = ConsumerGroup::try_new("g").unwrap();
        let FetchOutcome::Delivered(first) =
            partition.fetch_and_track(group.clone(), Duration::from_millis(100)).await
        else {
            panic!("expected delivery");
        };
        assert_eq!(first, msg);

        tokio::time::sleep(Duration::from_millis(30)).await;
        partition.sweep_expired();

        let FetchOutcome::Delivered(second) =
            partition.fetch_and_track(group, Duration::from_millis(100)).await
        else {
            panic!("expected redelivery");
        };
        assert_eq!(second.id, msg.id);
    }

    #[tokio::test]
    async fn shutdown_wakes_pending_fetch() {
        let (partition, _dir) = open_test_partition(10, Duration::from_secs(30)).await;
        let partition = Arc::new(partition);
        let waiter = {
            let partition = partition.clone();
            tokio::spawn(async move {
                let group = ConsumerGroup::try_new("g").unwrap();
                partition
                    .fetch_and_track(group, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        partition.shutdown();
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Closed));
    }
}
