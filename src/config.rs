//! Environment-driven configuration for the broker and proxy binaries.
//!
//! Mirrors the key/value table from the spec's configuration surface; every
//! field has the documented default and can be overridden by the
//! correspondingly named environment variable or CLI flag (via `clap`'s
//! `env` feature).

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};
use crate::protocol::TopicName;

/// Declared partition count for a topic, parsed from the `TOPICS` variable.
pub type TopicTable = HashMap<TopicName, u32>;

/// Parse the `TOPICS` value (`"events:8,orders:4,default:8"`) into a table
/// of topic name to declared partition count.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] if any entry is malformed (missing `:`,
/// non-numeric partition count, or an empty topic name).
pub fn parse_topics(raw: &str) -> Result<TopicTable> {
    let mut table = TopicTable::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, count) = entry
            .split_once(':')
            .ok_or_else(|| Error::BadRequest(format!("malformed TOPICS entry: {entry}")))?;
        let name = TopicName::try_new(name)
            .map_err(|err| Error::BadRequest(format!("invalid topic name {name:?}: {err}")))?;
        let count: u32 = count
            .trim()
            .parse()
            .map_err(|_| Error::BadRequest(format!("invalid partition count in {entry:?}")))?;
        table.insert(name, count);
    }
    Ok(table)
}

/// Configuration for a `flowmq-broker` process.
#[derive(Debug, Clone, Parser)]
#[command(name = "flowmq-broker")]
pub struct BrokerConfig {
    /// Listen port for the broker's HTTP server.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma-separated `<name>:<partitions>` topic table.
    #[arg(long, env = "TOPICS", default_value = "events:8,orders:4,default:8")]
    pub topics: String,

    /// In-memory queue capacity per partition.
    #[arg(long, env = "QUEUE_SIZE", default_value_t = 2000)]
    pub queue_size: usize,

    /// Visibility timeout, in seconds, before a delivered message is
    /// eligible for redelivery.
    #[arg(long, env = "VISIBILITY_TIMEOUT", default_value_t = 30)]
    pub visibility_timeout_seconds: u64,

    /// Root directory for per-partition append-only log files.
    #[arg(long, env = "STORAGE_DIR", default_value = "./data")]
    pub storage_dir: String,

    /// Bounded wait, in seconds, for a single `fetchAndTrack` poll.
    #[arg(long, default_value_t = 5)]
    pub fetch_timeout_seconds: u64,
}

impl BrokerConfig {
    /// Parse [`Self::topics`] into a topic table.
    ///
    /// # Errors
    ///
    /// See [`parse_topics`].
    pub fn topic_table(&self) -> Result<TopicTable> {
        parse_topics(&self.topics)
    }

    /// The configured visibility timeout as a [`Duration`].
    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    /// The configured fetch-and-track poll bound as a [`Duration`].
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Configuration for a `flowmq-proxy` process.
#[derive(Debug, Clone, Parser)]
#[command(name = "flowmq-proxy")]
pub struct ProxyConfig {
    /// Listen port for the proxy's HTTP server.
    #[arg(long, env = "PORT", default_value_t = 8090)]
    pub port: u16,

    /// Number of backend brokers to discover.
    #[arg(long, env = "BROKER_COUNT", default_value_t = 1)]
    pub broker_count: u32,

    /// Base service name used to build backend broker endpoint URLs, e.g.
    /// `http://<service>-<i>:<port>`.
    #[arg(long, env = "BROKER_SERVICE", default_value = "msg-queue")]
    pub broker_service: String,

    /// Virtual nodes per broker on the consistent-hash ring.
    #[arg(long, env = "VIRTUAL_NODES", default_value_t = 150)]
    pub virtual_nodes: u32,

    /// Partitions per topic; must agree with the brokers' own `TOPICS`
    /// configuration so that routing keys line up.
    #[arg(long, env = "MAX_PARTITIONS", default_value_t = 2)]
    pub max_partitions: u32,

    /// Health-check period, in seconds.
    #[arg(long, env = "HEALTH_INTERVAL_SECONDS", default_value_t = 30)]
    pub health_interval_seconds: u64,

    /// Port each discovered broker listens on.
    #[arg(long, env = "BROKER_PORT", default_value_t = 8080)]
    pub broker_port: u16,
}

impl ProxyConfig {
    /// Build the list of backend broker base URLs this proxy should
    /// discover, `http://<service>-<i>:<broker_port>` for `i` in
    /// `[0, broker_count)`.
    #[must_use]
    pub fn broker_endpoints(&self) -> Vec<String> {
        (0..self.broker_count)
            .map(|i| format!("http://{}-{}:{}", self.broker_service, i, self.broker_port))
            .collect()
    }

    /// The configured health-check period as a [`Duration`].
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topics_reads_default_table() {
        let table = parse_topics("events:8,orders:4,default:8").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table[&TopicName::try_new("events").unwrap()],
            8
        );
        assert_eq!(table[&TopicName::try_new("orders").unwrap()], 4);
    }

    #[test]
    fn parse_topics_rejects_malformed_entry() {
        assert!(parse_topics("events-8").is_err());
        assert!(parse_topics("events:notanumber").is_err());
    }

    #[test]
    fn broker_endpoints_are_indexed() {
        let cfg = ProxyConfig {
            port: 8090,
            broker_count: 3,
            broker_service: "msg-queue".to_string(),
            virtual_nodes: 150,
            max_partitions: 2,
            health_interval_seconds: 30,
            broker_port: 8080,
        };
        assert_eq!(
            cfg.broker_endpoints(),
            vec![
                "http://msg-queue-0:8080",
                "http://msg-queue-1:8080",
                "http://msg-queue-2:8080",
            ]
        );
    }
}
