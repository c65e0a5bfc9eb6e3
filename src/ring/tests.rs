//! Ring Module Tests
//!
//! Determinism, well-formedness and balance of node sequences for both ring strategies.

#[cfg(test)]
mod tests {
    use crate::node::types::NodeId;
    use crate::ring::*;
    use std::collections::HashSet;

    fn is_permutation(seq: &[NodeId], n: usize) -> bool {
        let ids: HashSet<usize> = seq.iter().map(|id| id.index()).collect();
        seq.len() == n && ids.len() == n && ids.iter().all(|&id| id < n)
    }

    // ============================================================
    // HASHING
    // ============================================================

    #[test]
    fn test_murmur3_reference_values() {
        assert_eq!(hash_bytes(b""), 0);
        assert_eq!(hash_key("hello"), 0x248b_fa47);
        assert_eq!(hash_key("hello"), hash_bytes("hello".as_bytes()));
    }

    // ============================================================
    // PERMUTATION TABLE
    // ============================================================

    #[test]
    fn test_table_has_every_permutation_in_order() {
        let table = PermutationTable::new(3).unwrap();
        assert_eq!(table.len(), 6);

        let rows: Vec<Vec<usize>> = (0..6)
            .map(|h| table.sequence(h).iter().map(|id| id.index()).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
        // Index wraps modulo N!
        assert_eq!(table.sequence(6), table.sequence(0));
    }

    #[test]
    fn test_table_size_limits() {
        assert!(matches!(PermutationTable::new(0), Err(RingError::EmptyCluster)));
        assert!(matches!(
            PermutationTable::new(MAX_PERMUTATION_NODES + 1),
            Err(RingError::TooManyNodes(9))
        ));
        assert_eq!(PermutationTable::new(MAX_PERMUTATION_NODES).unwrap().len(), 40320);
    }

    #[test]
    fn test_single_node_cluster() {
        let ring = Ring::new(1).unwrap();
        assert_eq!(ring.sequence("anything"), vec![NodeId(0)]);
        assert_eq!(ring.primary("anything"), NodeId(0));
    }

    // ============================================================
    // RING SELECTION & CONTRACT
    // ============================================================

    #[test]
    fn test_sequences_are_deterministic_and_well_formed() {
        for n in [1, 2, 4, 8, 12] {
            let a = Ring::new(n).unwrap();
            let b = Ring::new(n).unwrap();
            for i in 0..500 {
                let key = format!("user{}", i);
                let seq = a.sequence(&key);
                assert!(is_permutation(&seq, n), "n={} key={} seq={:?}", n, key, seq);
                assert_eq!(seq, b.sequence(&key));
                assert_eq!(seq[0], a.primary(&key));
            }
        }
    }

    #[test]
    fn test_ring_variant_selection() {
        assert!(matches!(Ring::new(0), Err(RingError::EmptyCluster)));
        assert!(matches!(Ring::new(4).unwrap(), Ring::Permutation(_)));
        assert!(matches!(Ring::new(9).unwrap(), Ring::Consistent(_)));
        assert_eq!(Ring::new(9).unwrap().node_count(), 9);
    }

    #[test]
    fn test_primaries_and_fallbacks_are_balanced() {
        let n = 4;
        let ring = Ring::new(n).unwrap();
        let keys = 20_000;

        let mut primaries = vec![0usize; n];
        // fallback counts for keys whose primary is node 0
        let mut fallbacks = vec![0usize; n];
        for i in 0..keys {
            let seq = ring.sequence(&format!("key-{}", i));
            primaries[seq[0].index()] += 1;
            if seq[0] == NodeId(0) {
                fallbacks[seq[1].index()] += 1;
            }
        }

        let expected = keys / n;
        for count in &primaries {
            assert!(
                count.abs_diff(expected) < expected / 10,
                "unbalanced primaries: {:?}",
                primaries
            );
        }

        assert_eq!(fallbacks[0], 0);
        let owned: usize = fallbacks.iter().sum();
        let expected = owned / (n - 1);
        for count in &fallbacks[1..] {
            assert!(
                count.abs_diff(expected) < expected / 5,
                "unbalanced fallbacks: {:?}",
                fallbacks
            );
        }
    }

    // ============================================================
    // CONSISTENT RING
    // ============================================================

    #[test]
    fn test_consistent_ring_covers_every_node() {
        let ring = ConsistentHashRing::with_vnodes(12, 4).unwrap();
        assert!(ring.token_count() <= 48);
        for h in [0u32, 1, u32::MAX / 3, u32::MAX] {
            let seq = ring.sequence(h);
            assert!(is_permutation(&seq, 12));
            assert_eq!(seq[0], ring.primary(h));
        }
    }

    #[test]
    fn test_consistent_ring_spreads_primaries() {
        let ring = Ring::new(12).unwrap();
        let mut primaries = vec![0usize; 12];
        for i in 0..24_000 {
            primaries[ring.primary(&format!("key-{}", i)).index()] += 1;
        }
        // 160 vnodes keep every node within a loose band of its fair share
        for count in &primaries {
            assert!(*count > 1_000 && *count < 3_000, "skewed ring: {:?}", primaries);
        }
    }
}
