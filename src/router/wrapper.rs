//! CacheWrapper
//!
//! Client-side router. Every GET/SET walks the key's node sequence: the primary gets the
//! plain verb, fallbacks get the backup verb on behalf of the primary. Each RPC runs under
//! `cache_timeout`; timeouts and transport errors feed the health table, and a node that
//! crosses the threshold is skipped until the recovery probe sees it answer again.
//!
//! Dropping a GET/SET future drops the in-flight RPC with it; nothing is spawned per
//! request.

use super::health::HealthTable;
use super::probe;
use super::types::{NodeHealth, RouterConfig};
use crate::client::NodeClient;
use crate::error::{RouterError, RpcError};
use crate::metrics::{MetricsSink, NoopMetrics, Operation, RequestOutcome};
use crate::node::types::{NodeId, Record};
use crate::ring::Ring;

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// State shared between the wrapper and its recovery probe.
#[derive(Debug)]
pub(crate) struct RouterCore {
    pub(crate) config: RouterConfig,
    pub(crate) ring: Ring,
    pub(crate) nodes: Vec<Arc<dyn NodeClient>>,
    pub(crate) health: HealthTable,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl RouterCore {
    /// Runs one RPC under the deadline and settles health and metrics for it.
    async fn attempt<T, F>(
        &self,
        op: Operation,
        node: NodeId,
        via_backup: bool,
        call: F,
        classify: fn(&T) -> RequestOutcome,
    ) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.cache_timeout, call)
            .await
            .unwrap_or(Err(RpcError::Timeout));

        let outcome = match &result {
            Ok(value) => classify(value),
            Err(RpcError::Timeout | RpcError::Transport(_)) => RequestOutcome::Timeout,
            Err(RpcError::Unavailable) => RequestOutcome::Unavailable,
            Err(_) => RequestOutcome::Error,
        };
        self.metrics
            .request_completed(op, node, via_backup, outcome, started.elapsed());

        match &result {
            Err(e) if e.counts_as_timeout() => {
                tracing::debug!("{:?} to node {} timed out: {}", op, node, e);
                if self.health.record_timeout(node) {
                    tracing::warn!(
                        "Node {} marked failed after {} consecutive timeouts",
                        node,
                        self.config.detect_threshold
                    );
                    self.metrics.node_tripped(node);
                }
            }
            _ => self.health.record_success(node),
        }
        result
    }

    /// Nodes to try for `key`, in order.
    fn route(&self, key: &str) -> Vec<NodeId> {
        let mut seq = self.ring.sequence(key);
        if !self.config.reconfigure_enabled {
            seq.truncate(1);
        }
        seq
    }

    async fn get(&self, key: &str, fields: &[String]) -> Result<Option<Record>, RouterError> {
        validate_key(key)?;
        let seq = self.route(key);
        let primary = seq[0];

        for (i, &node) in seq.iter().enumerate() {
            if self.health.is_failed(node) {
                tracing::trace!("GET {}: skipping failed node {}", key, node);
                continue;
            }
            let client = &self.nodes[node.index()];
            let via_backup = i > 0;
            let result = if via_backup {
                self.attempt(
                    Operation::Get,
                    node,
                    true,
                    client.get_backup(primary, key, fields),
                    classify_read,
                )
                .await
            } else {
                self.attempt(
                    Operation::Get,
                    node,
                    false,
                    client.get(key, fields),
                    classify_read,
                )
                .await
            };

            match result {
                Ok(record) => {
                    if via_backup {
                        tracing::debug!(
                            "GET {} served by fallback node {} for primary {}",
                            key,
                            node,
                            primary
                        );
                    }
                    return Ok(record);
                }
                Err(e) if is_failover(&e) => continue,
                Err(source) => return Err(RouterError::Rpc { node, source }),
            }
        }

        tracing::debug!("GET {}: all nodes failed", key);
        Err(RouterError::AllNodesFailed)
    }

    async fn set(&self, key: &str, record: &Record) -> Result<(), RouterError> {
        validate_key(key)?;
        let mut seq = self.ring.sequence(key);
        let primary = seq[0];
        let designated = Some(seq[1 % seq.len()]).filter(|b| *b != primary);
        if !self.config.reconfigure_enabled {
            seq.truncate(1);
        }

        for (i, &node) in seq.iter().enumerate() {
            if self.health.is_failed(node) {
                continue;
            }
            let client = &self.nodes[node.index()];
            let via_backup = i > 0;
            let result = if via_backup {
                self.attempt(
                    Operation::Set,
                    node,
                    true,
                    client.set_backup(primary, key, record),
                    classify_write,
                )
                .await
            } else {
                self.attempt(
                    Operation::Set,
                    node,
                    false,
                    client.set(key, record, designated),
                    classify_write,
                )
                .await
            };

            match result {
                Ok(_) => return Ok(()),
                Err(e) if is_failover(&e) => continue,
                Err(source) => return Err(RouterError::Rpc { node, source }),
            }
        }

        Err(RouterError::AllNodesFailed)
    }
}

fn validate_key(key: &str) -> Result<(), RouterError> {
    if key.is_empty() {
        return Err(RouterError::InvalidRequest("key must not be empty".into()));
    }
    Ok(())
}

/// Outcomes that move the request on to the next node. Unavailable replies skip the
/// node without counting toward detection.
fn is_failover(err: &RpcError) -> bool {
    err.counts_as_timeout() || *err == RpcError::Unavailable
}

fn classify_read(record: &Option<Record>) -> RequestOutcome {
    if record.is_some() {
        RequestOutcome::Hit
    } else {
        RequestOutcome::Miss
    }
}

fn classify_write(_size: &usize) -> RequestOutcome {
    RequestOutcome::Stored
}

/// Routes GET/SET across the cluster with failure detection and failover.
///
/// Must be created inside a Tokio runtime; the recovery probe runs until the wrapper is
/// dropped.
#[derive(Debug)]
pub struct CacheWrapper {
    core: Arc<RouterCore>,
    probe: JoinHandle<()>,
}

impl Drop for CacheWrapper {
    fn drop(&mut self) {
        self.probe.abort();
    }
}

impl CacheWrapper {
    /// `nodes[i]` must be the client for node id `i`.
    pub fn new(config: RouterConfig, nodes: Vec<Arc<dyn NodeClient>>) -> Result<Self, RouterError> {
        Self::with_metrics(config, nodes, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        config: RouterConfig,
        nodes: Vec<Arc<dyn NodeClient>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, RouterError> {
        let ring = Ring::new(nodes.len()).map_err(|e| RouterError::InvalidRequest(e.to_string()))?;
        let core = Arc::new(RouterCore {
            health: HealthTable::new(nodes.len(), config.detect_threshold),
            config,
            ring,
            nodes,
            metrics,
        });
        let probe = probe::spawn(&core);

        tracing::info!(
            "Router started: {} nodes, timeout {:?}, threshold {}, failover {}",
            core.nodes.len(),
            core.config.cache_timeout,
            core.config.detect_threshold,
            if core.config.reconfigure_enabled { "on" } else { "off" }
        );
        Ok(Self { core, probe })
    }

    /// Reads `key`, projected onto `fields` (empty means all). `Ok(None)` is a miss.
    pub async fn get(&self, key: &str, fields: &[String]) -> Result<Option<Record>, RouterError> {
        self.core.get(key, fields).await
    }

    /// Writes `key` to its primary, or to the first live fallback's backup store.
    pub async fn set(&self, key: &str, record: &Record) -> Result<(), RouterError> {
        self.core.set(key, record).await
    }

    pub async fn get_cancellable(
        &self,
        key: &str,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<Record>, RouterError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RouterError::Cancelled),
            result = self.core.get(key, fields) => result,
        }
    }

    pub async fn set_cancellable(
        &self,
        key: &str,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<(), RouterError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RouterError::Cancelled),
            result = self.core.set(key, record) => result,
        }
    }

    /// The key's node sequence, primary first.
    pub fn node_sequence(&self, key: &str) -> Vec<NodeId> {
        self.core.ring.sequence(key)
    }

    pub fn node_count(&self) -> usize {
        self.core.nodes.len()
    }

    pub fn client(&self, node: NodeId) -> Option<&Arc<dyn NodeClient>> {
        self.core.nodes.get(node.index())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.core.config
    }

    pub fn is_failed(&self, node: NodeId) -> bool {
        self.core.health.is_failed(node)
    }

    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.core.health.failed_nodes()
    }

    pub fn health(&self) -> Vec<NodeHealth> {
        self.core.health.snapshot()
    }

    pub(crate) fn core(&self) -> &Arc<RouterCore> {
        &self.core
    }

    /// Runs one recovery probe round now. Returns the nodes brought back.
    pub async fn probe_now(&self) -> Vec<NodeId> {
        probe::probe_failed(&self.core).await
    }
}
