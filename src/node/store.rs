//! Bounded Primary Store
//!
//! Holds the primary entries written through SET as encoded blobs. Every entry is charged
//! `key + blob + ENTRY_OVERHEAD` bytes against the node's memory ceiling; once a write would
//! cross the ceiling the configured `EvictionPolicy` decides what happens.
//!
//! Evictions are silent: neither the router nor backup holders are notified.

use super::types::{EvictionPolicy, Record};
use crate::error::NodeError;

use lru::LruCache;
use rand::Rng;

/// Fixed per-entry bookkeeping cost (hash-table slot, list links, length prefixes).
const ENTRY_OVERHEAD: usize = 48;

pub struct KvStore {
    entries: LruCache<String, Vec<u8>>,
    policy: EvictionPolicy,
    max_bytes: usize,
    used_bytes: usize,
    evictions: u64,
}

fn entry_size(key: &str, blob: &[u8]) -> usize {
    key.len() + blob.len() + ENTRY_OVERHEAD
}

impl KvStore {
    pub fn new(max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: LruCache::unbounded(),
            policy,
            max_bytes,
            used_bytes: 0,
            evictions: 0,
        }
    }

    /// Looks up `key`, promoting it in recency order, and projects it to `fields`.
    pub fn get(&mut self, key: &str, fields: &[String]) -> Result<Option<Record>, NodeError> {
        match self.entries.get(key) {
            Some(blob) => {
                let record = Record::decode(blob)
                    .map_err(|e| NodeError::Internal(format!("corrupt entry {key}: {e}")))?;
                Ok(Some(record.project(fields)))
            }
            None => Ok(None),
        }
    }

    /// Reads the full record without touching recency. Used by the push path so that
    /// background replication does not keep keys artificially warm.
    pub fn peek(&self, key: &str) -> Option<Record> {
        self.entries
            .peek(key)
            .and_then(|blob| Record::decode(blob).ok())
    }

    /// Stores `record` under `key`, returning the keys evicted to make room.
    pub fn set(&mut self, key: String, record: &Record) -> Result<Vec<String>, NodeError> {
        let blob = record
            .encode()
            .map_err(|e| NodeError::BadRequest(format!("unencodable record: {e}")))?;
        let new_size = entry_size(&key, &blob);
        if new_size > self.max_bytes {
            return Err(NodeError::OutOfMemory);
        }

        let old_size = self
            .entries
            .peek(key.as_str())
            .map(|old| entry_size(&key, old))
            .unwrap_or(0);
        let projected = self.used_bytes - old_size + new_size;

        if projected > self.max_bytes && self.policy == EvictionPolicy::NoEviction {
            return Err(NodeError::OutOfMemory);
        }

        self.entries.put(key.clone(), blob);
        self.used_bytes = projected;

        let mut evicted = Vec::new();
        while self.used_bytes > self.max_bytes {
            match self.evict_one(&key) {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }

        Ok(evicted)
    }

    /// Evicts one entry other than `keep`. Returns `None` when nothing is evictable.
    fn evict_one(&mut self, keep: &str) -> Option<String> {
        let victim = match self.policy {
            EvictionPolicy::AllKeysLru => self.entries.peek_lru().map(|(k, _)| k.clone()),
            EvictionPolicy::AllKeysRandom => {
                if self.entries.len() < 2 {
                    None
                } else {
                    // Linear walk; eviction is rare compared to lookups.
                    let candidates = self.entries.len() - usize::from(self.entries.contains(keep));
                    let idx = rand::thread_rng().gen_range(0..candidates.max(1));
                    self.entries
                        .iter()
                        .map(|(k, _)| k)
                        .filter(|k| k.as_str() != keep)
                        .nth(idx)
                        .cloned()
                }
            }
            EvictionPolicy::NoEviction => None,
        };

        let victim = victim.filter(|v| v.as_str() != keep)?;

        if let Some(blob) = self.entries.pop(victim.as_str()) {
            self.used_bytes -= entry_size(&victim, &blob);
            self.evictions += 1;
            tracing::trace!("Evicted {} ({:?})", victim, self.policy);
        }
        Some(victim)
    }

    pub fn remove(&mut self, key: &str) -> Option<Record> {
        let blob = self.entries.pop(key)?;
        self.used_bytes -= entry_size(key, &blob);
        Record::decode(&blob).ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &str) -> Record {
        Record::new().with_field("f", value.as_bytes().to_vec())
    }

    #[test]
    fn test_set_then_get_with_projection() {
        let mut store = KvStore::new(1 << 20, EvictionPolicy::AllKeysLru);
        let rec = Record::new().with_field("a", b"1".to_vec()).with_field("b", b"2".to_vec());
        store.set("k".to_string(), &rec).unwrap();

        assert_eq!(store.get("k", &[]).unwrap(), Some(rec));
        let projected = store.get("k", &["b".to_string()]).unwrap().unwrap();
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get("b"), Some(&b"2"[..]));
        assert_eq!(store.get("missing", &[]).unwrap(), None);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let one = entry_size("k0", &record("x").encode().unwrap());
        let mut store = KvStore::new(one * 3, EvictionPolicy::AllKeysLru);

        store.set("k0".to_string(), &record("x")).unwrap();
        store.set("k1".to_string(), &record("x")).unwrap();
        store.set("k2".to_string(), &record("x")).unwrap();
        // Touch k0 so k1 becomes the LRU victim
        store.get("k0", &[]).unwrap();
        let evicted = store.set("k3".to_string(), &record("x")).unwrap();

        assert_eq!(evicted, vec!["k1".to_string()]);
        assert_eq!(store.len(), 3);
        assert!(store.contains("k0"));
        assert!(!store.contains("k1"));
        assert!(store.contains("k3"));
        assert_eq!(store.evictions(), 1);
        assert!(store.used_bytes() <= one * 3);
    }

    #[test]
    fn test_random_eviction_keeps_new_key_and_ceiling() {
        let one = entry_size("k00", &record("x").encode().unwrap());
        let mut store = KvStore::new(one * 5, EvictionPolicy::AllKeysRandom);

        for i in 0..50 {
            let key = format!("k{:02}", i);
            store.set(key.clone(), &record("x")).unwrap();
            assert!(store.contains(&key), "fresh write must survive its own eviction");
            assert!(store.used_bytes() <= one * 5);
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.evictions(), 45);
    }

    #[test]
    fn test_noeviction_rejects_when_full() {
        let one = entry_size("k0", &record("x").encode().unwrap());
        let mut store = KvStore::new(one * 2, EvictionPolicy::NoEviction);

        store.set("k0".to_string(), &record("x")).unwrap();
        store.set("k1".to_string(), &record("x")).unwrap();
        assert_eq!(
            store.set("k2".to_string(), &record("x")),
            Err(NodeError::OutOfMemory)
        );
        // Overwriting an existing key with a same-sized value still fits
        store.set("k1".to_string(), &record("y")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_overwrite_adjusts_accounting() {
        let mut store = KvStore::new(1 << 20, EvictionPolicy::AllKeysLru);
        store.set("k".to_string(), &record("short")).unwrap();
        let before = store.used_bytes();
        store
            .set("k".to_string(), &record("a much longer value than before"))
            .unwrap();
        assert!(store.used_bytes() > before);
        assert_eq!(store.len(), 1);

        store.remove("k");
        assert_eq!(store.used_bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let mut store = KvStore::new(64, EvictionPolicy::AllKeysLru);
        let big = Record::new().with_field("f", vec![0u8; 1024]);
        assert_eq!(store.set("k".to_string(), &big), Err(NodeError::OutOfMemory));
        assert!(store.is_empty());
    }
}
