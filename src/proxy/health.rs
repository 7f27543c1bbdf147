//! Background health-check task: periodically probes every known broker
//! and updates the topology's health map.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::state::ProxyState;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn the periodic health-check task. Runs until `shutdown` is
/// cancelled.
pub fn spawn(state: Arc<ProxyState>, period: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => check_all(&state).await,
            }
        }
    });
}

async fn check_all(state: &ProxyState) {
    for broker in state.topology.brokers() {
        let url = format!("{broker}/health");
        let healthy = match tokio::time::timeout(
            HEALTH_CHECK_TIMEOUT,
            state.http.get(&url).send(),
        )
        .await
        {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(err)) => {
                tracing::debug!(broker, %err, "health check request failed");
                false
            }
            Err(_elapsed) => {
                tracing::debug!(broker, "health check timed out");
                false
            }
        };
        state.topology.set_health(broker, healthy, &state.stats);
    }
}
