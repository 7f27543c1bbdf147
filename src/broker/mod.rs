//! The broker: per-partition queue + log, visibility-timeout tracking, and
//! the HTTP surface in front of them.

pub mod handlers;
pub mod partition;
pub mod router;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use state::BrokerState;

/// Bind a `TcpListener` on `config.port` and return it along with the
/// address actually bound (useful for tests that bind an ephemeral port).
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

/// Serve the broker on `listener` until `shutdown` is cancelled, then
/// signal every hosted partition to stop so in-flight `/consume` streams
/// end cleanly.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(
    listener: TcpListener,
    state: Arc<BrokerState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let router = router::create_router(state.clone());
    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await;

    state.shutdown();
    result
}
