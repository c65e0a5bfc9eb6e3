//! Ring Module
//!
//! Maps a key to its **node sequence**: an ordering of every node id in the cluster. The
//! first entry is the key's primary, the rest are its fallbacks in order. Routers and
//! nodes build the same `Ring` from the same cluster size, so they always agree.
//!
//! ## Strategies
//! - **`PermutationTable`** (up to `MAX_PERMUTATION_NODES` nodes): all N! permutations in
//!   lexicographic order, indexed by `hash(key) mod N!`. Balances primaries and, for any
//!   failed primary, balances its fallbacks across the survivors.
//! - **`ConsistentHashRing`** (larger clusters): virtual nodes on a 32-bit ring; the
//!   sequence is the distinct nodes met walking clockwise from the key's hash.
//!
//! Keys are hashed with 32-bit MurmurHash3 (seed 0) over their UTF-8 bytes.

pub mod consistent;
pub mod permutation;

#[cfg(test)]
mod tests;

use crate::node::types::NodeId;

pub use consistent::ConsistentHashRing;
pub use permutation::{MAX_PERMUTATION_NODES, PermutationTable};

use std::io::Cursor;

/// 32-bit MurmurHash3 (seed 0) of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_32(&mut Cursor::new(bytes), 0).unwrap_or(0)
}

pub fn hash_key(key: &str) -> u32 {
    hash_bytes(key.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    #[error("cluster must contain at least one node")]
    EmptyCluster,

    #[error("cluster of {0} nodes exceeds the supported maximum")]
    TooManyNodes(usize),
}

/// Node ordering for a cluster of fixed size.
#[derive(Debug, Clone)]
pub enum Ring {
    Permutation(PermutationTable),
    Consistent(ConsistentHashRing),
}

impl Ring {
    /// Picks the permutation table when it is small enough, the hash ring otherwise.
    pub fn new(node_count: usize) -> Result<Self, RingError> {
        if node_count == 0 {
            return Err(RingError::EmptyCluster);
        }
        if node_count <= MAX_PERMUTATION_NODES {
            Ok(Ring::Permutation(PermutationTable::new(node_count)?))
        } else {
            Ok(Ring::Consistent(ConsistentHashRing::new(node_count)?))
        }
    }

    /// The full node sequence for `key`, primary first. Always a permutation of all ids.
    pub fn sequence(&self, key: &str) -> Vec<NodeId> {
        match self {
            Ring::Permutation(table) => table.sequence(hash_key(key)),
            Ring::Consistent(ring) => ring.sequence(hash_key(key)),
        }
    }

    pub fn primary(&self, key: &str) -> NodeId {
        match self {
            Ring::Permutation(table) => table.primary(hash_key(key)),
            Ring::Consistent(ring) => ring.primary(hash_key(key)),
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Ring::Permutation(table) => table.node_count(),
            Ring::Consistent(ring) => ring.node_count(),
        }
    }
}
