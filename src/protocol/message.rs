//! The `Message` wire type and the validated domain primitives around it.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, broker-generated message identifier (~128 bits of randomness,
/// URL-safe once rendered via [`MessageId::to_string`]).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh, random message id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

/// A topic name. Topics are registered at startup; this type only enforces
/// that the name is non-empty, matching the liberal naming the config file
/// permits.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TopicName(String);

/// A consumer group label. Opaque to the broker beyond equality comparison.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct ConsumerGroup(String);

/// A partition index within a topic, in `[0, N)`.
pub type PartitionIndex = u32;

/// The unit of transfer between producers and consumers.
///
/// Once constructed, every field is immutable: redelivery and requeue
/// operate on this same value, never a mutated copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Broker-generated opaque identifier.
    pub id: MessageId,
    /// Opaque payload bytes, carried as a UTF-8 string on the wire.
    pub payload: String,
    /// Wall-clock creation timestamp. Not required to be monotonic within a
    /// partition.
    pub created_at: DateTime<Utc>,
    /// The topic this message was produced to.
    pub topic: TopicName,
    /// The partition this message was produced to.
    pub partition: PartitionIndex,
}

impl Message {
    /// Construct a new message with a freshly generated id and the current
    /// wall-clock time.
    #[must_use]
    pub fn new(topic: TopicName, partition: PartitionIndex, payload: String) -> Self {
        Self {
            id: MessageId::generate(),
            payload,
            created_at: Utc::now(),
            topic,
            partition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::new(
            TopicName::try_new("events").unwrap(),
            3,
            "hello".to_string(),
        );
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn topic_name_rejects_empty() {
        assert!(TopicName::try_new("").is_err());
        assert!(TopicName::try_new("   ").is_err());
    }

    #[test]
    fn message_id_parses_its_own_display() {
        let id = MessageId::generate();
        let round_tripped: MessageId = id.to_string().parse().unwrap();
        assert_eq!(id, round_tripped);
    }
}
