//! Metrics Sink
//!
//! The router reports what it does to an injected `MetricsSink`. Correctness never depends
//! on the sink: every hook has an empty default body and `NoopMetrics` is what a
//! `CacheWrapper` gets unless told otherwise.

use crate::node::types::NodeId;

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestOutcome {
    Hit,
    Miss,
    Stored,
    Timeout,
    Unavailable,
    Error,
}

pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    /// One RPC finished. `via_backup` is true when a fallback node served it.
    fn request_completed(
        &self,
        _op: Operation,
        _node: NodeId,
        _via_backup: bool,
        _outcome: RequestOutcome,
        _latency: Duration,
    ) {
    }

    /// The router's detector marked `node` failed.
    fn node_tripped(&self, _node: NodeId) {}

    /// A recovery probe brought `node` back.
    fn node_recovered(&self, _node: NodeId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Counting sink for tests and embedders.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    backup_served: AtomicU64,
    trips: AtomicU64,
    recoveries: AtomicU64,
    outcomes: Mutex<HashMap<(Operation, RequestOutcome), u64>>,
    per_node: Mutex<HashMap<NodeId, u64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub backup_served: u64,
    pub trips: u64,
    pub recoveries: u64,
    pub outcomes: Vec<(Operation, RequestOutcome, u64)>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, op: Operation, outcome: RequestOutcome) -> u64 {
        self.outcomes
            .lock()
            .get(&(op, outcome))
            .copied()
            .unwrap_or(0)
    }

    /// RPCs sent to `node`, whatever their outcome.
    pub fn requests_to(&self, node: NodeId) -> u64 {
        self.per_node.lock().get(&node).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut outcomes: Vec<_> = self
            .outcomes
            .lock()
            .iter()
            .map(|(&(op, outcome), &n)| (op, outcome, n))
            .collect();
        outcomes.sort_by_key(|&(op, outcome, _)| (op as u8, outcome as u8));

        MetricsSnapshot {
            backup_served: self.backup_served.load(Ordering::Relaxed),
            trips: self.trips.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            outcomes,
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn request_completed(
        &self,
        op: Operation,
        node: NodeId,
        via_backup: bool,
        outcome: RequestOutcome,
        _latency: Duration,
    ) {
        if via_backup && matches!(outcome, RequestOutcome::Hit | RequestOutcome::Stored) {
            self.backup_served.fetch_add(1, Ordering::Relaxed);
        }
        *self.outcomes.lock().entry((op, outcome)).or_insert(0) += 1;
        *self.per_node.lock().entry(node).or_insert(0) += 1;
    }

    fn node_tripped(&self, _node: NodeId) {
        self.trips.fetch_add(1, Ordering::Relaxed);
    }

    fn node_recovered(&self, _node: NodeId) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }
}
