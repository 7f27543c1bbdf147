//! Wire types shared by the broker, proxy, and client.

pub mod message;
pub mod sse;

pub use message::{ConsumerGroup, Message, MessageId, PartitionIndex, TopicName};
