//! `flowmq-proxy` — stateless consistent-hash router in front of N
//! brokers.

use clap::Parser;
use flowmq::config::ProxyConfig;
use flowmq::proxy::{bind, serve, ProxyState};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("flowmq=info".parse()?),
        )
        .init();

    let config = ProxyConfig::parse();
    let brokers = config.broker_endpoints();
    info!(?brokers, port = config.port, "starting flowmq-proxy");

    let state = ProxyState::new(&config);
    let (listener, addr) = bind(config.port).await?;
    info!(%addr, "proxy listening");

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        ctrl_c_shutdown.cancel();
    });

    serve(listener, state, config.health_interval(), shutdown).await?;
    info!("flowmq-proxy shut down cleanly");
    Ok(())
}
