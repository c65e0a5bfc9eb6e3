use super::{RingError, hash_bytes};
use crate::node::types::NodeId;

use std::collections::BTreeMap;

/// Virtual nodes placed per physical node.
pub const DEFAULT_VNODES: usize = 160;

/// Consistent-hashing ring with virtual nodes.
///
/// Token positions are derived from `"{id}-{vnode}"` so every process builds an identical
/// ring. Colliding tokens keep the lower node id.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    node_count: usize,
    tokens: BTreeMap<u32, NodeId>,
}

impl ConsistentHashRing {
    pub fn new(node_count: usize) -> Result<Self, RingError> {
        Self::with_vnodes(node_count, DEFAULT_VNODES)
    }

    pub fn with_vnodes(node_count: usize, vnodes: usize) -> Result<Self, RingError> {
        if node_count == 0 {
            return Err(RingError::EmptyCluster);
        }
        let vnodes = vnodes.max(1);

        let mut tokens = BTreeMap::new();
        for id in 0..node_count {
            for vnode in 0..vnodes {
                let token = hash_bytes(format!("{}-{}", id, vnode).as_bytes());
                tokens.entry(token).or_insert(NodeId(id));
            }
        }

        Ok(Self { node_count, tokens })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Distinct nodes met walking clockwise from `hash`. Nodes that lost every token to
    /// collisions are appended in id order so the result always covers the cluster.
    pub fn sequence(&self, hash: u32) -> Vec<NodeId> {
        let mut seen = vec![false; self.node_count];
        let mut sequence = Vec::with_capacity(self.node_count);

        let clockwise = self
            .tokens
            .range(hash..)
            .chain(self.tokens.range(..hash))
            .map(|(_, node)| *node);

        for node in clockwise {
            if !seen[node.index()] {
                seen[node.index()] = true;
                sequence.push(node);
                if sequence.len() == self.node_count {
                    return sequence;
                }
            }
        }

        sequence.extend(
            (0..self.node_count)
                .filter(|&id| !seen[id])
                .map(NodeId),
        );
        sequence
    }

    pub fn primary(&self, hash: u32) -> NodeId {
        self.tokens
            .range(hash..)
            .next()
            .or_else(|| self.tokens.iter().next())
            .map(|(_, node)| *node)
            .unwrap_or(NodeId(0))
    }
}
