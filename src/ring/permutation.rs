use super::RingError;
use crate::node::types::NodeId;

/// Largest cluster served by the permutation table (8! = 40320 rows).
pub const MAX_PERMUTATION_NODES: usize = 8;

/// Every permutation of `0..n` in lexicographic order, stored row-major in one buffer.
#[derive(Debug, Clone)]
pub struct PermutationTable {
    node_count: usize,
    rows: usize,
    cells: Vec<u8>,
}

fn factorial(n: usize) -> usize {
    (1..=n).product()
}

/// Advances `perm` to its lexicographic successor. Returns false after the last one.
fn next_permutation(perm: &mut [u8]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }
    let mut i = n - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = n - 1;
    while perm[j] <= perm[i - 1] {
        j -= 1;
    }
    perm.swap(i - 1, j);
    perm[i..].reverse();
    true
}

impl PermutationTable {
    pub fn new(node_count: usize) -> Result<Self, RingError> {
        if node_count == 0 {
            return Err(RingError::EmptyCluster);
        }
        if node_count > MAX_PERMUTATION_NODES {
            return Err(RingError::TooManyNodes(node_count));
        }

        let rows = factorial(node_count);
        let mut cells = Vec::with_capacity(rows * node_count);
        let mut perm: Vec<u8> = (0..node_count as u8).collect();
        loop {
            cells.extend_from_slice(&perm);
            if !next_permutation(&mut perm) {
                break;
            }
        }
        debug_assert_eq!(cells.len(), rows * node_count);

        Ok(Self {
            node_count,
            rows,
            cells,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of permutations (N!).
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn row(&self, hash: u32) -> &[u8] {
        let start = (hash as usize % self.rows) * self.node_count;
        &self.cells[start..start + self.node_count]
    }

    pub fn sequence(&self, hash: u32) -> Vec<NodeId> {
        self.row(hash).iter().map(|&id| NodeId(id as usize)).collect()
    }

    pub fn primary(&self, hash: u32) -> NodeId {
        NodeId(self.row(hash)[0] as usize)
    }
}
