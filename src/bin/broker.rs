//! `flowmq-broker` — hosts a fixed set of partitions for the configured
//! topics and serves the produce/consume/ack HTTP surface.

use std::sync::Arc;

use clap::Parser;
use flowmq::broker::{bind, serve, BrokerState};
use flowmq::config::BrokerConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("flowmq=info".parse()?),
        )
        .init();

    let config = BrokerConfig::parse();
    let topics = config.topic_table()?;
    info!(?topics, port = config.port, "starting flowmq-broker");

    let state = Arc::new(BrokerState::new(&config, topics));
    let (listener, addr) = bind(config.port).await?;
    info!(%addr, "broker listening");

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        ctrl_c_shutdown.cancel();
    });

    serve(listener, state, shutdown).await?;
    info!("flowmq-broker shut down cleanly");
    Ok(())
}
