//! Cluster Configuration
//!
//! One JSON record describes the whole cluster: the node list plus router and node knobs.
//! The router reads it at startup, builds its `RouterConfig` from it and derives each
//! node's NEW-NODE bootstrap request from it.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": 0, "address": "127.0.0.1:7000", "maxMemoryMegabytes": 64 },
//!     { "id": 1, "address": "127.0.0.1:7001", "evictionPolicy": "allkeys-random" }
//!   ],
//!   "cacheTimeoutMs": 200,
//!   "detectThreshold": 3
//! }
//! ```

use crate::node::protocol::NewNodeRequest;
use crate::node::types::{
    DEFAULT_HOT_KEY_PERCENTILE, DEFAULT_MAX_MEMORY_MB, EvictionPolicy, FailureMode, NodeId,
};
use crate::router::types::RouterConfig;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_true() -> bool {
    true
}
fn default_cache_timeout_ms() -> u64 {
    2000
}
fn default_detect_threshold() -> u32 {
    1000
}
fn default_probe_interval_ms() -> u64 {
    100
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_percentile() -> f64 {
    DEFAULT_HOT_KEY_PERCENTILE
}
fn default_max_memory_mb() -> usize {
    DEFAULT_MAX_MEMORY_MB
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub id: NodeId,
    pub address: String,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_megabytes: usize,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub nodes: Vec<NodeConfig>,
    #[serde(default = "default_true")]
    pub reconfigure_enabled: bool,
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,
    #[serde(default = "default_detect_threshold")]
    pub detect_threshold: u32,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub hot_key_tick_interval_ms: u64,
    #[serde(default = "default_percentile")]
    pub hot_key_percentile: f64,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default = "default_true")]
    pub backup_read_falls_back_to_primary: bool,
}

impl ClusterConfig {
    /// A config with defaults for everything but the node addresses, ids assigned in order.
    pub fn with_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: addresses
                .into_iter()
                .enumerate()
                .map(|(id, address)| NodeConfig {
                    id: NodeId(id),
                    address: address.into(),
                    max_memory_megabytes: DEFAULT_MAX_MEMORY_MB,
                    eviction_policy: EvictionPolicy::default(),
                })
                .collect(),
            reconfigure_enabled: true,
            cache_timeout_ms: default_cache_timeout_ms(),
            detect_threshold: default_detect_threshold(),
            probe_interval_ms: default_probe_interval_ms(),
            hot_key_tick_interval_ms: default_tick_interval_ms(),
            hot_key_percentile: DEFAULT_HOT_KEY_PERCENTILE,
            failure_mode: FailureMode::default(),
            backup_read_falls_back_to_primary: true,
        }
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading cluster config {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("parsing cluster config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: ClusterConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("cluster config lists no nodes");
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                bail!("duplicate node id {}", node.id);
            }
            if node.max_memory_megabytes == 0 {
                bail!("node {} has maxMemoryMegabytes = 0", node.id);
            }
            if node.address.trim().is_empty() {
                bail!("node {} has an empty address", node.id);
            }
        }
        if let Some(id) = (0..self.nodes.len()).find(|id| !ids.contains(&NodeId(*id))) {
            bail!("node ids must be 0..{}; id {} is missing", self.nodes.len(), id);
        }

        if self.cache_timeout_ms == 0 {
            bail!("cacheTimeoutMs must be positive");
        }
        if self.detect_threshold == 0 {
            bail!("detectThreshold must be positive");
        }
        if self.probe_interval_ms == 0 {
            bail!("probeIntervalMs must be positive");
        }
        if self.hot_key_tick_interval_ms == 0 {
            bail!("hotKeyTickIntervalMs must be positive");
        }
        if !(self.hot_key_percentile > 0.0 && self.hot_key_percentile <= 1.0) {
            bail!(
                "hotKeyPercentile must be in (0, 1], got {}",
                self.hot_key_percentile
            );
        }
        Ok(())
    }

    /// Nodes sorted by id, so index == id.
    pub fn nodes_by_id(&self) -> Vec<&NodeConfig> {
        let mut nodes: Vec<&NodeConfig> = self.nodes.iter().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    pub fn addresses(&self) -> Vec<String> {
        self.nodes_by_id()
            .into_iter()
            .map(|node| node.address.clone())
            .collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeConfig> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            reconfigure_enabled: self.reconfigure_enabled,
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            detect_threshold: self.detect_threshold,
            probe_interval: Duration::from_millis(self.probe_interval_ms),
        }
    }

    /// The NEW-NODE request that seeds node `id`.
    pub fn new_node_request(&self, id: NodeId) -> Option<NewNodeRequest> {
        let node = self.node(id)?;
        Some(NewNodeRequest {
            id,
            max_mem_mbs: node.max_memory_megabytes,
            eviction_policy: node.eviction_policy,
            update_interval_sec: self.hot_key_tick_interval_ms as f64 / 1000.0,
            peers: self.addresses(),
            hot_key_percentile: self.hot_key_percentile,
            failure_mode: self.failure_mode,
            backup_read_falls_back_to_primary: self.backup_read_falls_back_to_primary,
        })
    }
}
