use super::types::NodeHealth;
use crate::node::types::NodeId;

use parking_lot::RwLock;

/// The router's belief about which nodes are down.
///
/// Read on every request, written only when a counter moves or a node flips, so it sits
/// behind one reader/writer lock.
#[derive(Debug)]
pub struct HealthTable {
    threshold: u32,
    nodes: RwLock<Vec<NodeHealth>>,
}

impl HealthTable {
    pub fn new(node_count: usize, threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            nodes: RwLock::new(vec![NodeHealth::default(); node_count]),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_failed(&self, node: NodeId) -> bool {
        self.nodes
            .read()
            .get(node.index())
            .is_some_and(|health| health.failed)
    }

    /// A non-timeout reply: the consecutive-timeout streak is broken.
    pub fn record_success(&self, node: NodeId) {
        let streak = self
            .nodes
            .read()
            .get(node.index())
            .map_or(0, |health| health.consecutive_timeouts);
        if streak == 0 {
            return;
        }
        if let Some(health) = self.nodes.write().get_mut(node.index()) {
            health.consecutive_timeouts = 0;
        }
    }

    /// Counts a timeout. Returns true exactly when this timeout flags the node failed.
    pub fn record_timeout(&self, node: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let Some(health) = nodes.get_mut(node.index()) else {
            return false;
        };
        if health.failed {
            return false;
        }
        health.consecutive_timeouts = health.consecutive_timeouts.saturating_add(1);
        if health.consecutive_timeouts >= self.threshold {
            health.failed = true;
            health.consecutive_timeouts = 0;
            return true;
        }
        false
    }

    /// Flags a node failed without counting (bootstrap non-responders).
    pub fn mark_failed(&self, node: NodeId) {
        if let Some(health) = self.nodes.write().get_mut(node.index()) {
            health.failed = true;
            health.consecutive_timeouts = 0;
        }
    }

    /// Clears the failed flag. Returns true if the node was flagged.
    pub fn mark_recovered(&self, node: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let Some(health) = nodes.get_mut(node.index()) else {
            return false;
        };
        let was_failed = health.failed;
        health.failed = false;
        health.consecutive_timeouts = 0;
        was_failed
    }

    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .read()
            .iter()
            .enumerate()
            .filter(|(_, health)| health.failed)
            .map(|(id, _)| NodeId(id))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<NodeHealth> {
        self.nodes.read().clone()
    }
}
