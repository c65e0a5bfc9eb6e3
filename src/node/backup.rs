//! Backup Store
//!
//! Hot entries pushed here by peers, indexed by the pushing (origin) node. Entries for
//! origin `o` are only read by GET-BACKUP requests naming `o`, i.e. by routers whose
//! primary for the key is `o` and who believe `o` is down.

use super::types::{NodeId, Record};

use dashmap::DashMap;
use std::collections::HashMap;

/// Structure: `Origin Node -> Key -> Record`.
#[derive(Default)]
pub struct BackupStore {
    origins: DashMap<NodeId, HashMap<String, Record>>,
}

impl BackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `(origin, key)`.
    pub fn receive(&self, origin: NodeId, key: String, record: Record) {
        self.origins.entry(origin).or_default().insert(key, record);
    }

    /// Looks up `(origin, key)` and projects it. Never consults other origins.
    pub fn get(&self, origin: NodeId, key: &str, fields: &[String]) -> Option<Record> {
        self.origins
            .get(&origin)
            .and_then(|entries| entries.get(key).map(|record| record.project(fields)))
    }

    pub fn origin_len(&self, origin: NodeId) -> usize {
        self.origins
            .get(&origin)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.origins.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.origins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_scoped_by_origin() {
        let store = BackupStore::new();
        let rec = Record::new().with_field("f", b"v".to_vec());
        store.receive(NodeId(1), "k".to_string(), rec.clone());

        assert_eq!(store.get(NodeId(1), "k", &[]), Some(rec));
        assert_eq!(store.get(NodeId(2), "k", &[]), None);
        assert_eq!(store.origin_len(NodeId(1)), 1);
        assert_eq!(store.origin_len(NodeId(2)), 0);
    }

    #[test]
    fn test_receive_replaces_and_clear_flushes() {
        let store = BackupStore::new();
        store.receive(NodeId(0), "k".to_string(), Record::new().with_field("f", b"1".to_vec()));
        store.receive(NodeId(0), "k".to_string(), Record::new().with_field("f", b"2".to_vec()));
        store.receive(NodeId(3), "j".to_string(), Record::new());

        assert_eq!(store.len(), 2);
        let rec = store.get(NodeId(0), "k", &["f".to_string()]).unwrap();
        assert_eq!(rec.get("f"), Some(&b"2"[..]));

        store.clear();
        assert!(store.is_empty());
    }
}
