//! End-to-end cluster scenarios over real HTTP.
//!
//! Four axum nodes on ephemeral ports, a router bootstrapped from a `ClusterConfig`,
//! cacheTimeout 200 ms, detectThreshold 3, probe every 100 ms, hot tick 50 ms and a
//! hot-key percentile of 0.25.

use cache_cluster::client::{HttpNodeClient, NodeClient, http_connector};
use cache_cluster::config::ClusterConfig;
use cache_cluster::metrics::{InMemoryMetrics, MetricsSink};
use cache_cluster::node::server::NodeServer;
use cache_cluster::node::types::{NodeId, Record};
use cache_cluster::{CacheWrapper, RouterError};

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Cluster {
    servers: Vec<Arc<NodeServer>>,
    config: ClusterConfig,
    shutdown: CancellationToken,
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Cluster {
    async fn start(n: usize) -> Self {
        let shutdown = CancellationToken::new();
        let mut servers = Vec::new();
        let mut addresses = Vec::new();

        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap().to_string();
            let server = NodeServer::new(address.clone(), http_connector());

            let token = shutdown.clone();
            tokio::spawn(
                server
                    .clone()
                    .serve(listener, async move { token.cancelled().await }),
            );
            servers.push(server);
            addresses.push(address);
        }

        let mut config = ClusterConfig::with_addresses(addresses);
        config.cache_timeout_ms = 200;
        config.detect_threshold = 3;
        config.probe_interval_ms = 100;
        config.hot_key_tick_interval_ms = 50;
        config.hot_key_percentile = 0.25;

        Self {
            servers,
            config,
            shutdown,
        }
    }

    async fn router(&self) -> CacheWrapper {
        CacheWrapper::bootstrap(&self.config).await.unwrap()
    }

    async fn router_with_metrics(&self, metrics: Arc<dyn MetricsSink>) -> CacheWrapper {
        let connector = http_connector();
        let clients = self
            .config
            .addresses()
            .iter()
            .map(|address| connector(address.as_str()))
            .collect();
        CacheWrapper::bootstrap_with(&self.config, clients, metrics)
            .await
            .unwrap()
    }

    fn client(&self, node: NodeId) -> HttpNodeClient {
        HttpNodeClient::new(self.servers[node.index()].address())
    }
}

fn record(value: &str) -> Record {
    Record::new().with_field("f", value.as_bytes().to_vec())
}

/// Some key whose primary is `node`.
fn key_with_primary(router: &CacheWrapper, node: NodeId, skip: usize) -> String {
    (0..)
        .map(|i| format!("key-{}", i))
        .filter(|key| router.node_sequence(key)[0] == node)
        .nth(skip)
        .unwrap()
}

async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn primary_serves_reads_without_fallback() {
    let cluster = Cluster::start(4).await;
    let metrics = Arc::new(InMemoryMetrics::new());
    let router = cluster.router_with_metrics(metrics.clone()).await;
    assert!(router.failed_nodes().is_empty());

    router.set("x", &record("1")).await.unwrap();
    let got = router.get("x", &[]).await.unwrap();
    assert_eq!(got, Some(record("1")));

    let seq = router.node_sequence("x");
    assert_eq!(metrics.requests_to(seq[0]), 2);
    for id in &seq[1..] {
        assert_eq!(metrics.requests_to(*id), 0, "fallback {} was contacted", id);
    }
    assert_eq!(metrics.snapshot().backup_served, 0);

    let primary = cluster.servers[seq[0].index()].node().unwrap();
    assert_eq!(primary.access_count("x"), 2);
}

#[tokio::test]
async fn miss_is_not_an_error() {
    let cluster = Cluster::start(4).await;
    let router = cluster.router().await;
    assert_eq!(router.get("y", &[]).await, Ok(None));
}

#[tokio::test]
async fn hot_key_survives_primary_failure() {
    let cluster = Cluster::start(4).await;
    let router = cluster.router().await;
    let seq = router.node_sequence("z");

    router.set("z", &record("9")).await.unwrap();
    for _ in 0..10 {
        router.get("z", &[]).await.unwrap();
    }

    let backup = cluster.servers[seq[1].index()].node().unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || backup.backup_entry(seq[0], "z")
            == Some(record("9")))
        .await,
        "hot key never reached its designated backup"
    );

    cluster.client(seq[0]).fail().await.unwrap();

    let got = router.get("z", &[]).await.unwrap();
    assert_eq!(got, Some(record("9")));
}

#[tokio::test]
async fn detection_then_recovery() {
    let cluster = Cluster::start(4).await;
    let router = cluster.router().await;
    let n = NodeId(2);

    cluster.client(n).fail().await.unwrap();

    for i in 0..3 {
        assert!(!router.is_failed(n));
        let key = key_with_primary(&router, n, i);
        assert_eq!(router.get(&key, &[]).await, Ok(None));
    }
    assert!(router.is_failed(n), "three timeouts must trip the node");

    // Tripped: the next request goes straight to the fallback
    let key = key_with_primary(&router, n, 3);
    let started = Instant::now();
    assert_eq!(router.get(&key, &[]).await, Ok(None));
    assert!(started.elapsed() < Duration::from_millis(150));

    // Still unresponsive: probes keep it flagged
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(router.is_failed(n));

    cluster.client(n).recover().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || !router.is_failed(n)).await,
        "probe did not notice the recovered node"
    );

    router.set(&key, &record("back")).await.unwrap();
    let node = cluster.servers[n.index()].node().unwrap();
    assert_eq!(node.size(), 1, "primary must be targeted first again");
    assert_eq!(router.get(&key, &[]).await, Ok(Some(record("back"))));
}

#[tokio::test]
async fn all_nodes_failed() {
    let cluster = Cluster::start(4).await;
    let router = cluster.router().await;

    for id in 0..4 {
        cluster.client(NodeId(id)).fail().await.unwrap();
    }

    let started = Instant::now();
    assert_eq!(router.get("k", &[]).await, Err(RouterError::AllNodesFailed));
    // Roughly cacheTimeout per node
    assert!(started.elapsed() < Duration::from_millis(200 * 4 + 500));
}

#[tokio::test]
async fn unreachable_node_is_failed_from_the_start() {
    let mut cluster = Cluster::start(3).await;

    // Point node 2 at a port nobody listens on
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_address = dead.local_addr().unwrap().to_string();
    drop(dead);
    cluster.config.nodes[2].address = dead_address;

    let router = cluster.router().await;
    assert_eq!(router.failed_nodes(), vec![NodeId(2)]);

    // Keys owned by the dead node still work through the fallbacks
    let key = key_with_primary(&router, NodeId(2), 0);
    router.set(&key, &record("v")).await.unwrap();
    assert_eq!(router.get(&key, &[]).await, Ok(Some(record("v"))));
}

#[tokio::test]
async fn stats_endpoint_reports_node_state() {
    let cluster = Cluster::start(2).await;
    let router = cluster.router().await;
    router.set("s", &record("v")).await.unwrap();

    let primary = router.node_sequence("s")[0];
    let url = format!(
        "http://{}/stats",
        cluster.servers[primary.index()].address()
    );
    let stats: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();
    assert_eq!(stats["id"], primary.index());
    assert_eq!(stats["size"], 1);
    assert_eq!(stats["state"], "Ready");
}
