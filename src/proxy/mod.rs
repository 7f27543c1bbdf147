//! The proxy: a stateless consistent-hash router in front of N brokers.

pub mod forward;
pub mod handlers;
pub mod health;
pub mod ring;
pub mod router;
pub mod stats;
pub mod state;
pub mod topology;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use state::ProxyState;

/// Bind a `TcpListener` on `port`.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn bind(port: u16) -> std::io::Result<(TcpListener, SocketAddr)> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    Ok((listener, actual_addr))
}

/// Serve the proxy on `listener`, with the background health-check task
/// running alongside, until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ProxyState>,
    health_interval: std::time::Duration,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    health::spawn(state.clone(), health_interval, shutdown.clone());

    let router = router::create_router(state);
    let shutdown_signal = async move { shutdown.cancelled().await };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
}
