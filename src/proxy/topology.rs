//! The proxy's view of broker health layered on top of the immutable ring.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::error::{Error, Result};

use super::ring::Ring;
use super::stats::Stats;

/// Broker endpoints, the ring built over them, and their live/dead status.
///
/// The ring is rebuilt (a fresh `Ring` constructed and atomically swapped
/// in) only when the broker *set* changes; a health-check recovery or
/// failure is a tombstone-bit flip in `health`, not a ring rebuild (spec
/// §3, "Ring (proxy-side)" lifecycle notes).
pub struct Topology {
    ring: RwLock<Arc<Ring>>,
    brokers: Vec<String>,
    health: DashMap<String, bool>,
    virtual_nodes: u32,
}

impl Topology {
    /// Build a topology over `brokers`, with every broker assumed healthy
    /// until the first health check proves otherwise.
    #[must_use]
    pub fn new(brokers: Vec<String>, virtual_nodes: u32) -> Self {
        let ring = Ring::build(&brokers, virtual_nodes);
        let health = DashMap::new();
        for broker in &brokers {
            health.insert(broker.clone(), true);
        }
        Self {
            ring: RwLock::new(Arc::new(ring)),
            brokers,
            health,
            virtual_nodes,
        }
    }

    /// The statically configured broker set.
    #[must_use]
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    fn current_ring(&self) -> Arc<Ring> {
        self.ring.read().expect("ring lock poisoned").clone()
    }

    /// Rebuild the ring over the current broker set. Exposed for
    /// deployments that change `brokers` at runtime; the core's static
    /// `BROKER_COUNT` configuration does not call this itself.
    pub fn rebuild_ring(&self) {
        let ring = Ring::build(&self.brokers, self.virtual_nodes);
        *self.ring.write().expect("ring lock poisoned") = Arc::new(ring);
    }

    /// Is `endpoint` currently marked healthy?
    #[must_use]
    pub fn is_healthy(&self, endpoint: &str) -> bool {
        self.health.get(endpoint).map_or(false, |h| *h)
    }

    /// Record a health-check result for `endpoint`. Returns `true` if this
    /// call changed the recorded status (a transition worth counting in
    /// statistics).
    pub fn set_health(&self, endpoint: &str, healthy: bool, stats: &Stats) -> bool {
        let changed = self
            .health
            .get(endpoint)
            .map_or(true, |h| *h != healthy);
        self.health.insert(endpoint.to_string(), healthy);
        if changed {
            stats.record_health_transition(endpoint);
            tracing::info!(endpoint, healthy, "broker health transition");
        }
        changed
    }

    /// Route `key` to a healthy broker: the ring's natural owner if
    /// healthy, otherwise the first healthy broker found by scanning the
    /// static broker list (not the ring, per spec §4.3).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHealthyBroker`] if no broker in the set is
    /// currently healthy.
    pub fn route(&self, key: &str) -> Result<String> {
        let ring = self.current_ring();
        if let Some(owner) = ring.lookup(key) {
            if self.is_healthy(owner) {
                return Ok(owner.to_string());
            }
        }
        self.any_healthy()
    }

    /// Any currently healthy broker, for requests not tied to a specific
    /// partition (`/topics`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHealthyBroker`] if none are healthy.
    pub fn any_healthy(&self) -> Result<String> {
        self.brokers
            .iter()
            .find(|b| self.is_healthy(b))
            .cloned()
            .ok_or(Error::NoHealthyBroker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Stats {
        Stats::default()
    }

    #[test]
    fn routes_to_ring_owner_when_healthy() {
        let topo = Topology::new(
            vec!["http://b0:8080".into(), "http://b1:8080".into()],
            150,
        );
        let key = "events-partition-0";
        let owner = topo.route(key).unwrap();
        assert!(topo.brokers().contains(&owner));
    }

    #[test]
    fn failover_routes_around_unhealthy_owner() {
        let topo = Topology::new(
            vec!["http://b0:8080".into(), "http://b1:8080".into()],
            150,
        );
        let stats = stats();
        // Mark both candidates' owner-independent fallback: make b0 unhealthy
        // and confirm every key still routes somewhere healthy.
        topo.set_health("http://b0:8080", false, &stats);
        for i in 0..20 {
            let key = format!("events-partition-{i}");
            let route = topo.route(&key).unwrap();
            assert_eq!(route, "http://b1:8080");
        }
    }

    #[test]
    fn no_healthy_broker_is_an_error() {
        let topo = Topology::new(vec!["http://b0:8080".into()], 150);
        let stats = stats();
        topo.set_health("http://b0:8080", false, &stats);
        assert!(topo.route("events-partition-0").is_err());
    }

    #[test]
    fn recovery_restores_original_routing() {
        let topo = Topology::new(
            vec!["http://b0:8080".into(), "http://b1:8080".into()],
            150,
        );
        let stats = stats();
        let key = "events-partition-7";
        let original = topo.route(key).unwrap();

        topo.set_health(&original, false, &stats);
        assert_ne!(topo.route(key).unwrap(), original);

        topo.set_health(&original, true, &stats);
        assert_eq!(topo.route(key).unwrap(), original);
    }
}
