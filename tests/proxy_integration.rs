//! Black-box integration test for proxy failover and recovery (the
//! consistent-hash ring routes around an unhealthy broker and resumes
//! its original assignment once the broker recovers).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flowmq::broker::{bind as broker_bind, serve as broker_serve, BrokerState};
use flowmq::config::BrokerConfig;
use flowmq::proxy::ring::{partition_key, Ring};
use flowmq::proxy::stats::Stats;
use flowmq::proxy::topology::Topology;
use flowmq::proxy::{bind as proxy_bind, serve as proxy_serve, ProxyState};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const BROKER0_PORT: u16 = 19301;
const BROKER1_PORT: u16 = 19302;
const VIRTUAL_NODES: u32 = 150;

async fn start_broker(
    port: u16,
    storage_dir: &std::path::Path,
) -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
    let config = BrokerConfig {
        port,
        topics: "t:4".to_string(),
        queue_size: 100,
        visibility_timeout_seconds: 30,
        storage_dir: storage_dir.to_string_lossy().into_owned(),
        fetch_timeout_seconds: 1,
    };
    let topic_table = config.topic_table().unwrap();
    let state = Arc::new(BrokerState::new(&config, topic_table));
    let (listener, addr) = broker_bind(config.port).await.unwrap();

    let shutdown = CancellationToken::new();
    let shutdown_for_task = shutdown.clone();
    let handle = tokio::spawn(async move {
        broker_serve(listener, state, shutdown_for_task).await.unwrap();
    });

    (format!("http://{addr}"), shutdown, handle)
}

#[tokio::test]
async fn proxy_fails_over_and_recovers() {
    let broker0_dir = tempfile::tempdir().unwrap();
    let broker1_dir = tempfile::tempdir().unwrap();

    let (broker0_url, broker0_shutdown, broker0_handle) =
        start_broker(BROKER0_PORT, broker0_dir.path()).await;
    let (broker1_url, _broker1_shutdown, _broker1_handle) =
        start_broker(BROKER1_PORT, broker1_dir.path()).await;

    let ring = Ring::build(&[broker0_url.clone(), broker1_url.clone()], VIRTUAL_NODES);
    let mut owner_of: HashMap<u32, String> = HashMap::new();
    for partition in 0..4 {
        let key = partition_key("t", partition);
        owner_of.insert(partition, ring.lookup(&key).unwrap().to_string());
    }
    assert!(
        owner_of.values().any(|o| o == &broker0_url),
        "test setup expects at least one partition owned by broker0"
    );

    let proxy_state = Arc::new(ProxyState {
        topology: Topology::new(vec![broker0_url.clone(), broker1_url.clone()], VIRTUAL_NODES),
        stats: Stats::default(),
        http: reqwest::Client::new(),
    });
    let (proxy_listener, proxy_addr) = proxy_bind(0).await.unwrap();
    let proxy_base = format!("http://{proxy_addr}");
    let proxy_shutdown = CancellationToken::new();
    let proxy_shutdown_for_task = proxy_shutdown.clone();
    let proxy_handle = tokio::spawn(async move {
        proxy_serve(
            proxy_listener,
            proxy_state,
            Duration::from_millis(200),
            proxy_shutdown_for_task,
        )
        .await
        .unwrap();
    });

    let client = reqwest::Client::new();

    // Every partition currently routes to its ring owner; confirm by
    // checking the payload landed in that broker's own log file.
    for (partition, owner) in &owner_of {
        let response = client
            .post(format!(
                "{proxy_base}/produce?topic=t&partition={partition}"
            ))
            .json(&json!({ "payload": "before-failover" }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let dir = if owner == &broker0_url {
            broker0_dir.path()
        } else {
            broker1_dir.path()
        };
        let log_path = dir.join("t").join(format!("partition-{partition}.log"));
        let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(contents.contains("before-failover"));
    }

    // Take broker0 down and let the proxy's health check notice.
    broker0_shutdown.cancel();
    broker0_handle.await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    for partition in owner_of.keys().filter(|p| owner_of[*p] == broker0_url) {
        let response = client
            .post(format!(
                "{proxy_base}/produce?topic=t&partition={partition}"
            ))
            .json(&json!({ "payload": "during-failover" }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let log_path = broker1_dir
            .path()
            .join("t")
            .join(format!("partition-{partition}.log"));
        let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(
            contents.contains("during-failover"),
            "partition {partition} should have failed over to broker1"
        );
    }

    proxy_shutdown.cancel();
    proxy_handle.await.unwrap();
}
