//! # flowmq - a partitioned, HTTP-fronted message broker
//!
//! flowmq is a lightweight message broker built around per-topic
//! partitions, each an in-memory queue backed by an append-only log, with
//! visibility-timeout tracking for at-least-once delivery. A companion
//! proxy routes producer and consumer requests across a fleet of brokers
//! with a consistent-hash ring, and a small client library wraps both
//! sides of the wire protocol.
//!
//! ## Components
//!
//! - [`broker`]: the partition/queue/log core and its HTTP surface.
//! - [`proxy`]: the stateless consistent-hash router in front of N
//!   brokers, with health monitoring and failover.
//! - [`client`]: a producer/consumer client for either a broker or a
//!   proxy endpoint.
//! - [`protocol`]: wire types and SSE framing shared by all three.
//! - [`config`]: `clap`-derived configuration for the two binaries.
//! - [`error`]: the error type shared across the crate.

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{ConsumerGroup, Message, MessageId, PartitionIndex, TopicName};
