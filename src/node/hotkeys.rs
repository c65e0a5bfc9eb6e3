//! Hot-Key Tracking
//!
//! Counts accesses per key and, once per tick, recomputes which keys are "hot": the top
//! `percentile` fraction of tracked keys by access count. Writes to a key are versioned so
//! the push path knows which values still have to reach the key's designated backup.
//!
//! ## Bookkeeping
//! - `counts`: monotonically increasing access counter per key.
//! - `changed`: keys whose count moved since the last recompute (drained every tick).
//! - `unpushed`: latest write version per key not yet acknowledged by the backup. This
//!   is the persistent dirty bit; a failed push leaves it set so the next tick retries.
//! - `in_flight`: keys (and the version) with a push currently outstanding. Caps
//!   outstanding work at one push per key regardless of write churn.
//!
//! The tracker itself is not synchronized; `CacheNode` keeps it behind a single mutex and
//! never holds that mutex across network I/O.

use super::types::NodeId;

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// A backup push the node should send: `(origin = self, key, value, count)` to `backup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTicket {
    pub key: String,
    pub backup: NodeId,
    pub version: u64,
    pub access_count: u64,
}

pub struct HotKeyTracker {
    percentile: f64,
    counts: HashMap<String, u64>,
    hot: HashSet<String>,
    changed: HashSet<String>,
    designated_backup: HashMap<String, NodeId>,
    unpushed: HashMap<String, u64>,
    in_flight: HashMap<String, u64>,
    next_version: u64,
}

impl HotKeyTracker {
    pub fn new(percentile: f64) -> Self {
        Self {
            percentile,
            counts: HashMap::new(),
            hot: HashSet::new(),
            changed: HashSet::new(),
            designated_backup: HashMap::new(),
            unpushed: HashMap::new(),
            in_flight: HashMap::new(),
            next_version: 0,
        }
    }

    /// Counts one primary access (GET or SET) of `key`.
    pub fn record_access(&mut self, key: &str) -> u64 {
        let count = match self.counts.get_mut(key) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.counts.insert(key.to_string(), 1);
                1
            }
        };
        self.mark_changed(key);
        count
    }

    /// Raises the local count to at least `count` (a peer pushed a popular key here).
    pub fn observe_count(&mut self, key: &str, count: u64) {
        let current = self.counts.entry(key.to_string()).or_insert(0);
        if count > *current {
            *current = count;
            self.mark_changed(key);
        }
    }

    fn mark_changed(&mut self, key: &str) {
        if !self.changed.contains(key) {
            self.changed.insert(key.to_string());
        }
    }

    /// Records a new value for `key` and the backup chosen for it at write time.
    ///
    /// Returns a push to send right away when the key is already hot and no push for it
    /// is outstanding; otherwise the next tick picks the write up.
    pub fn record_write(&mut self, key: &str, backup: Option<NodeId>) -> Option<PushTicket> {
        self.next_version += 1;
        let version = self.next_version;

        match backup {
            Some(backup) => {
                self.designated_backup.insert(key.to_string(), backup);
            }
            None => {
                self.designated_backup.remove(key);
            }
        }
        self.unpushed.insert(key.to_string(), version);

        if self.hot.contains(key) {
            self.claim(key)
        } else {
            None
        }
    }

    /// Recomputes the hot set if any count changed since the last call.
    ///
    /// Keys are ordered by count (descending), ties broken by key, and the first
    /// `floor(len * percentile) + 1` of them are hot. Returns whether a recompute ran.
    pub fn recompute(&mut self) -> bool {
        if self.changed.is_empty() {
            return false;
        }
        self.changed.clear();

        let quota = self.hot_quota(self.counts.len());
        let mut ranked: Vec<(&String, u64)> = self.counts.iter().map(|(k, c)| (k, *c)).collect();
        ranked.sort_unstable_by(|a, b| Reverse(a.1).cmp(&Reverse(b.1)).then_with(|| a.0.cmp(b.0)));

        self.hot = ranked
            .into_iter()
            .take(quota)
            .map(|(k, _)| k.clone())
            .collect();
        true
    }

    fn hot_quota(&self, tracked: usize) -> usize {
        if tracked == 0 {
            return 0;
        }
        let quota = (tracked as f64 * self.percentile).floor() as usize + 1;
        quota.min(tracked)
    }

    /// Claims every hot key that has an unacknowledged write and a designated backup.
    pub fn take_pending_pushes(&mut self) -> Vec<PushTicket> {
        let mut due: Vec<String> = self
            .hot
            .iter()
            .filter(|k| self.unpushed.contains_key(*k) && !self.in_flight.contains_key(*k))
            .filter(|k| self.designated_backup.contains_key(*k))
            .cloned()
            .collect();
        due.sort();

        due.iter().filter_map(|k| self.claim(k)).collect()
    }

    fn claim(&mut self, key: &str) -> Option<PushTicket> {
        if self.in_flight.contains_key(key) {
            return None;
        }
        let version = *self.unpushed.get(key)?;
        let backup = *self.designated_backup.get(key)?;
        self.in_flight.insert(key.to_string(), version);
        Some(PushTicket {
            key: key.to_string(),
            backup,
            version,
            access_count: self.count(key),
        })
    }

    /// Settles a push. On success the dirty bit clears, unless a newer write landed
    /// while the push was in flight.
    pub fn finish_push(&mut self, ticket: &PushTicket, delivered: bool) {
        self.release(ticket);
        if delivered && self.unpushed.get(&ticket.key) == Some(&ticket.version) {
            self.unpushed.remove(&ticket.key);
        }
    }

    /// Forgets the pending-push state of keys the store evicted. Access counts stay.
    pub fn forget_values<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.unpushed.remove(key);
            self.designated_backup.remove(key);
        }
    }

    /// Drops the dirty bit for a key whose value no longer exists locally (evicted).
    pub fn discard(&mut self, ticket: &PushTicket) {
        self.release(ticket);
        if self.unpushed.get(&ticket.key) == Some(&ticket.version) {
            self.unpushed.remove(&ticket.key);
        }
    }

    fn release(&mut self, ticket: &PushTicket) {
        if self.in_flight.get(&ticket.key) == Some(&ticket.version) {
            self.in_flight.remove(&ticket.key);
        }
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.hot.contains(key)
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.unpushed.contains_key(key)
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn tracked_len(&self) -> usize {
        self.counts.len()
    }

    /// Keys holding push bookkeeping (a designated backup or an unacknowledged write).
    pub fn pending_len(&self) -> usize {
        self.designated_backup.len().max(self.unpushed.len())
    }

    pub fn hot_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.hot.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Forgets everything except the version counter, which stays monotonic so late
    /// acknowledgements from before the reset can never match a newer write.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.hot.clear();
        self.changed.clear();
        self.designated_backup.clear();
        self.unpushed.clear();
        self.in_flight.clear();
    }
}
