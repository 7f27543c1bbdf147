//! Shared state behind every proxy HTTP handler.

use std::sync::Arc;

use crate::config::ProxyConfig;

use super::stats::Stats;
use super::topology::Topology;

/// Shared state behind every proxy HTTP handler.
pub struct ProxyState {
    /// The broker ring plus health map.
    pub topology: Topology,
    /// Request/latency/health-transition counters.
    pub stats: Stats,
    /// Pooled HTTP client used to forward requests to brokers.
    pub http: reqwest::Client,
}

impl ProxyState {
    /// Build proxy state from `config`, discovering brokers via
    /// [`ProxyConfig::broker_endpoints`].
    #[must_use]
    pub fn new(config: &ProxyConfig) -> Arc<Self> {
        let brokers = config.broker_endpoints();
        let http = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("reqwest client configuration is always valid");

        Arc::new(Self {
            topology: Topology::new(brokers, config.virtual_nodes),
            stats: Stats::default(),
            http,
        })
    }
}
