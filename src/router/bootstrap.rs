use super::wrapper::CacheWrapper;
use crate::client::{NodeClient, http_connector};
use crate::config::ClusterConfig;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::node::types::NodeId;

use anyhow::{Result, bail};
use futures::future::join_all;
use std::sync::Arc;

impl CacheWrapper {
    /// Connects to every configured node over HTTP, seeds each with NEW-NODE and starts
    /// routing. Nodes that do not acknowledge NEW-NODE start out flagged failed.
    pub async fn bootstrap(config: &ClusterConfig) -> Result<Self> {
        let connector = http_connector();
        let clients = config
            .addresses()
            .iter()
            .map(|address| connector(address.as_str()))
            .collect();
        Self::bootstrap_with(config, clients, Arc::new(NoopMetrics)).await
    }

    /// Like `bootstrap`, over caller-supplied clients (`clients[i]` talks to node `i`).
    pub async fn bootstrap_with(
        config: &ClusterConfig,
        clients: Vec<Arc<dyn NodeClient>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        if clients.len() != config.nodes.len() {
            bail!(
                "{} clients supplied for {} configured nodes",
                clients.len(),
                config.nodes.len()
            );
        }

        let router_config = config.router_config();
        let deadline = router_config.cache_timeout;
        let wrapper = CacheWrapper::with_metrics(router_config, clients, metrics)?;

        let seeds = (0..config.nodes.len()).map(NodeId).map(|id| {
            let client = wrapper.client(id).cloned();
            let request = config.new_node_request(id);
            async move {
                let (Some(client), Some(request)) = (client, request) else {
                    return (id, Err("node missing from config".to_string()));
                };
                let outcome = match tokio::time::timeout(deadline, client.new_node(&request)).await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("deadline exceeded".to_string()),
                };
                (id, outcome)
            }
        });

        let mut ready = 0;
        for (id, outcome) in join_all(seeds).await {
            match outcome {
                Ok(()) => ready += 1,
                Err(reason) => {
                    tracing::warn!("Node {} did not accept NEW-NODE ({}); marking failed", id, reason);
                    wrapper.core().health.mark_failed(id);
                }
            }
        }

        tracing::info!(
            "Cluster bootstrapped: {}/{} nodes ready",
            ready,
            config.nodes.len()
        );
        Ok(wrapper)
    }
}
