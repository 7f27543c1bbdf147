//! Per-request-type, per-broker statistics for the proxy's `/stats` and
//! `/metrics` endpoints.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// The kind of request being routed, used as half of the statistics key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// `/produce`
    Produce,
    /// `/consume`
    Consume,
    /// `/ack`
    Ack,
    /// `/topics` or `/health` (not tied to a specific partition)
    Other,
}

impl RequestKind {
    fn as_str(self) -> &'static str {
        match self {
            RequestKind::Produce => "produce",
            RequestKind::Consume => "consume",
            RequestKind::Ack => "ack",
            RequestKind::Other => "other",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    latency_ms_total: AtomicU64,
    latency_count: AtomicU64,
}

/// Lock-free-on-the-hot-path request counters, keyed by request kind and
/// target broker, plus broker health-transition counters.
#[derive(Default)]
pub struct Stats {
    per_broker: DashMap<(RequestKind, String), Counters>,
    health_transitions: DashMap<String, AtomicU64>,
}

impl Stats {
    /// Record that a request of `kind` is being attempted against
    /// `broker`.
    pub fn record_attempt(&self, kind: RequestKind, broker: &str) {
        self.per_broker
            .entry((kind, broker.to_string()))
            .or_default()
            .attempts
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome and latency of a completed request.
    pub fn record_result(&self, kind: RequestKind, broker: &str, success: bool, latency: Duration) {
        let entry = self.per_broker.entry((kind, broker.to_string())).or_default();
        if success {
            entry.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.failures.fetch_add(1, Ordering::Relaxed);
        }
        entry
            .latency_ms_total
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        entry.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broker health-status transition (healthy<->unhealthy).
    pub fn record_health_transition(&self, broker: &str) {
        self.health_transitions
            .entry(broker.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A JSON-friendly snapshot for `/stats`.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        let mut by_broker = serde_json::Map::new();
        for entry in &self.per_broker {
            let (kind, broker) = entry.key();
            let counters = entry.value();
            let attempts = counters.attempts.load(Ordering::Relaxed);
            let successes = counters.successes.load(Ordering::Relaxed);
            let failures = counters.failures.load(Ordering::Relaxed);
            let latency_count = counters.latency_count.load(Ordering::Relaxed);
            let latency_total = counters.latency_ms_total.load(Ordering::Relaxed);
            let average_latency_ms = if latency_count > 0 {
                latency_total as f64 / latency_count as f64
            } else {
                0.0
            };

            let broker_entry = by_broker
                .entry(broker.clone())
                .or_insert_with(|| serde_json::json!({}));
            broker_entry[kind.as_str()] = serde_json::json!({
                "attempts": attempts,
                "successes": successes,
                "failures": failures,
                "average_latency_ms": average_latency_ms,
            });
        }

        let health_transitions: serde_json::Map<String, serde_json::Value> = self
            .health_transitions
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    serde_json::json!(entry.value().load(Ordering::Relaxed)),
                )
            })
            .collect();

        serde_json::json!({
            "brokers": by_broker,
            "health_transitions": health_transitions,
        })
    }

    /// Render a Prometheus-style text exposition for `/metrics`.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# TYPE flowmq_proxy_requests_total counter");
        for entry in &self.per_broker {
            let (kind, broker) = entry.key();
            let counters = entry.value();
            let attempts = counters.attempts.load(Ordering::Relaxed);
            let successes = counters.successes.load(Ordering::Relaxed);
            let failures = counters.failures.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "flowmq_proxy_requests_total{{kind=\"{}\",broker=\"{broker}\",result=\"attempt\"}} {attempts}",
                kind.as_str()
            );
            let _ = writeln!(
                out,
                "flowmq_proxy_requests_total{{kind=\"{}\",broker=\"{broker}\",result=\"success\"}} {successes}",
                kind.as_str()
            );
            let _ = writeln!(
                out,
                "flowmq_proxy_requests_total{{kind=\"{}\",broker=\"{broker}\",result=\"failure\"}} {failures}",
                kind.as_str()
            );
        }
        let _ = writeln!(out, "# TYPE flowmq_proxy_health_transitions_total counter");
        for entry in &self.health_transitions {
            let _ = writeln!(
                out,
                "flowmq_proxy_health_transitions_total{{broker=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_attempts_and_results_independently_per_broker() {
        let stats = Stats::default();
        stats.record_attempt(RequestKind::Produce, "b0");
        stats.record_result(RequestKind::Produce, "b0", true, Duration::from_millis(10));
        stats.record_attempt(RequestKind::Produce, "b1");
        stats.record_result(RequestKind::Produce, "b1", false, Duration::from_millis(20));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot["brokers"]["b0"]["produce"]["successes"], 1);
        assert_eq!(snapshot["brokers"]["b1"]["produce"]["failures"], 1);
    }

    #[test]
    fn health_transitions_are_counted() {
        let stats = Stats::default();
        stats.record_health_transition("b0");
        stats.record_health_transition("b0");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot["health_transitions"]["b0"], 2);
    }

    #[test]
    fn prometheus_rendering_includes_broker_labels() {
        let stats = Stats::default();
        stats.record_attempt(RequestKind::Consume, "b0");
        let text = stats.render_prometheus();
        assert!(text.contains("flowmq_proxy_requests_total"));
        assert!(text.contains("broker=\"b0\""));
    }
}
