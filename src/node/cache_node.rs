//! Cache Node
//!
//! One member of the cache cluster. Serves primary reads and writes from its bounded
//! `KvStore`, tracks key popularity, answers backup reads on behalf of failed peers and
//! pushes its own hot keys to each key's designated backup.
//!
//! ## Locking
//! - `failed`: read-held for the duration of every operation's critical section and
//!   write-held by FAIL / RECOVER, so a crash clears all state atomically.
//! - `store` and `hot_keys`: short critical sections, acquired in that order.
//! - No lock is ever held across an `.await`; peer pushes run in detached tasks that
//!   re-take the `hot_keys` lock only to settle the outcome.
//!
//! ## Failure simulation
//! While `Failed`, a node either never answers (`FailureMode::Unresponsive`, the default,
//! so callers' deadlines fire) or answers `NodeError::Unavailable` immediately. Requests
//! parked by an unresponsive node are released by RECOVER and answered `Unavailable`;
//! they never touch the re-initialised state.

use super::backup::BackupStore;
use super::hotkeys::{HotKeyTracker, PushTicket};
use super::store::KvStore;
use super::types::*;
use crate::client::NodeClient;
use crate::error::NodeError;

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct CacheNode {
    params: NodeParams,
    failed: RwLock<bool>,
    /// Wakes requests parked on an unresponsive failed node.
    recovered: Notify,
    store: Mutex<KvStore>,
    hot_keys: Mutex<HotKeyTracker>,
    backups: BackupStore,
    /// Clients for every cluster member, indexed by node id.
    peers: RwLock<Vec<Arc<dyn NodeClient>>>,
}

fn validate_key(key: &str) -> Result<(), NodeError> {
    if key.is_empty() {
        return Err(NodeError::BadRequest("key must not be empty".into()));
    }
    Ok(())
}

impl CacheNode {
    pub fn new(params: NodeParams) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(KvStore::new(
                params.max_memory_bytes,
                params.eviction_policy,
            )),
            hot_keys: Mutex::new(HotKeyTracker::new(params.hot_key_percentile)),
            backups: BackupStore::new(),
            failed: RwLock::new(false),
            recovered: Notify::new(),
            peers: RwLock::new(Vec::new()),
            params,
        })
    }

    pub fn id(&self) -> NodeId {
        self.params.id
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    pub fn set_peers(&self, peers: Vec<Arc<dyn NodeClient>>) {
        *self.peers.write() = peers;
    }

    pub fn state(&self) -> NodeState {
        if *self.failed.read() {
            NodeState::Failed
        } else {
            NodeState::Ready
        }
    }

    /// Spawns the periodic hot-key tick. The task holds only a weak handle and exits
    /// once the node is dropped.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::downgrade(self);
        let period = self.params.tick_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(node) = node.upgrade() else {
                    break;
                };
                node.tick();
            }
        })
    }

    /// Suspends until RECOVER or fails fast when the node is down, per the failure mode.
    async fn when_ready(&self) -> Result<(), NodeError> {
        let recovered = self.recovered.notified();
        let failed = *self.failed.read();
        if !failed {
            return Ok(());
        }
        if self.params.failure_mode == FailureMode::Unresponsive {
            recovered.await;
        }
        Err(NodeError::Unavailable)
    }

    /// Runs `op` while holding the failed-flag read lock.
    fn with_ready<T>(&self, op: impl FnOnce() -> Result<T, NodeError>) -> Result<T, NodeError> {
        let failed = self.failed.read();
        if *failed {
            return Err(NodeError::Unavailable);
        }
        op()
    }

    pub async fn get(&self, key: &str, fields: &[String]) -> Result<ReadResult, NodeError> {
        validate_key(key)?;
        self.when_ready().await?;

        self.with_ready(|| {
            let (record, size) = {
                let mut store = self.store.lock();
                (store.get(key, fields)?, store.len())
            };
            self.hot_keys.lock().record_access(key);

            tracing::trace!("GET {} on node {} (hit={})", key, self.id(), record.is_some());
            Ok(ReadResult { record, size })
        })
    }

    /// Serves a read on behalf of the failed primary `origin`.
    pub async fn get_backup(
        &self,
        origin: NodeId,
        key: &str,
        fields: &[String],
    ) -> Result<ReadResult, NodeError> {
        validate_key(key)?;
        self.when_ready().await?;

        self.with_ready(|| {
            let mut record = self.backups.get(origin, key, fields);
            let size = {
                let mut store = self.store.lock();
                if record.is_none() && self.params.backup_read_falls_back_to_primary {
                    record = store.get(key, fields)?;
                }
                store.len()
            };
            self.hot_keys.lock().record_access(key);

            tracing::debug!(
                "GET-BACKUP {} for origin {} on node {} (hit={})",
                key,
                origin,
                self.id(),
                record.is_some()
            );
            Ok(ReadResult { record, size })
        })
    }

    /// Primary write. If the key is hot the new value is pushed to `backup` right away.
    pub async fn set(
        self: &Arc<Self>,
        key: String,
        record: Record,
        backup: Option<NodeId>,
    ) -> Result<usize, NodeError> {
        validate_key(&key)?;
        self.when_ready().await?;
        let backup = backup.filter(|b| *b != self.id());

        let (size, ticket) = self.with_ready(|| {
            let (size, evicted) = {
                let mut store = self.store.lock();
                let evicted = store.set(key.clone(), &record)?;
                (store.len(), evicted)
            };
            let mut hot = self.hot_keys.lock();
            hot.forget_values(evicted.iter().map(String::as_str));
            hot.record_access(&key);
            Ok((size, hot.record_write(&key, backup)))
        })?;

        if let Some(ticket) = ticket {
            self.dispatch_push(ticket, record);
        }
        Ok(size)
    }

    /// Direct write into the backup store for `origin`, bypassing hot-key tracking.
    pub async fn set_backup(
        &self,
        origin: NodeId,
        key: String,
        record: Record,
    ) -> Result<usize, NodeError> {
        validate_key(&key)?;
        self.when_ready().await?;

        self.with_ready(|| {
            self.backups.receive(origin, key, record);
            Ok(self.backups.origin_len(origin))
        })
    }

    /// Accepts a hot-key push from `origin`.
    pub async fn push_update(
        &self,
        origin: NodeId,
        key: String,
        record: Record,
        access_count: u64,
    ) -> Result<(), NodeError> {
        validate_key(&key)?;
        self.when_ready().await?;

        self.with_ready(|| {
            self.hot_keys.lock().observe_count(&key, access_count);
            tracing::trace!("Received push of {} from node {}", key, origin);
            self.backups.receive(origin, key, record);
            Ok(())
        })
    }

    pub async fn ping(&self) -> Result<(), NodeError> {
        self.when_ready().await?;
        self.with_ready(|| Ok(()))
    }

    /// Simulated crash: drops every piece of live state. Idempotent.
    pub fn fail(&self) {
        let mut failed = self.failed.write();
        *failed = true;
        self.store.lock().clear();
        self.hot_keys.lock().clear();
        self.backups.clear();
        tracing::info!("Node {} FAILED (state flushed)", self.id());
    }

    /// Re-initialises the node and resumes serving.
    pub fn recover(&self) {
        let mut failed = self.failed.write();
        self.store.lock().clear();
        self.hot_keys.lock().clear();
        self.backups.clear();
        *failed = false;
        drop(failed);
        self.recovered.notify_waiters();
        tracing::info!("Node {} RECOVERED", self.id());
    }

    /// One hot-key maintenance cycle: recompute the hot set, then push every dirty hot
    /// key to its designated backup. Returns the number of pushes dispatched.
    pub fn tick(self: &Arc<Self>) -> usize {
        let tickets = {
            let failed = self.failed.read();
            if *failed {
                return 0;
            }
            let mut hot = self.hot_keys.lock();
            if hot.recompute() {
                tracing::trace!(
                    "Node {} hot set: {} of {} keys",
                    self.id(),
                    hot.hot_len(),
                    hot.tracked_len()
                );
            }
            hot.take_pending_pushes()
        };

        let mut dispatched = 0;
        for ticket in tickets {
            let value = self.store.lock().peek(&ticket.key);
            match value {
                Some(record) => {
                    self.dispatch_push(ticket, record);
                    dispatched += 1;
                }
                None => {
                    // Evicted since the write; nothing left to replicate.
                    self.hot_keys.lock().discard(&ticket);
                }
            }
        }
        dispatched
    }

    fn dispatch_push(self: &Arc<Self>, ticket: PushTicket, record: Record) {
        let node = self.clone();
        tokio::spawn(async move {
            node.deliver(ticket, record).await;
        });
    }

    async fn deliver(&self, ticket: PushTicket, record: Record) {
        let peer = self.peers.read().get(ticket.backup.index()).cloned();

        let delivered = match peer {
            Some(peer) => {
                let push = peer.push_update(self.id(), &ticket.key, &record, ticket.access_count);
                match tokio::time::timeout(self.params.push_timeout, push).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            "Push of {} to node {} failed: {}",
                            ticket.key,
                            ticket.backup,
                            e
                        );
                        false
                    }
                    Err(_) => {
                        tracing::warn!("Push of {} to node {} timed out", ticket.key, ticket.backup);
                        false
                    }
                }
            }
            None => {
                tracing::warn!("No peer client for backup node {}", ticket.backup);
                false
            }
        };

        if delivered {
            tracing::debug!(
                "Pushed hot key {} (count={}) to node {}",
                ticket.key,
                ticket.access_count,
                ticket.backup
            );
        }
        self.hot_keys.lock().finish_push(&ticket, delivered);
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.hot_keys.lock().is_hot(key)
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.hot_keys.lock().is_dirty(key)
    }

    pub fn access_count(&self, key: &str) -> u64 {
        self.hot_keys.lock().count(key)
    }

    pub fn backup_entry(&self, origin: NodeId, key: &str) -> Option<Record> {
        self.backups.get(origin, key, &[])
    }

    pub fn size(&self) -> usize {
        self.store.lock().len()
    }

    pub fn pending_pushes(&self) -> usize {
        self.hot_keys.lock().pending_len()
    }

    pub fn stats(&self) -> NodeStats {
        let state = self.state();
        let (size, used_bytes, evictions) = {
            let store = self.store.lock();
            (store.len(), store.used_bytes(), store.evictions())
        };
        let (tracked_keys, hot_keys) = {
            let hot = self.hot_keys.lock();
            (hot.tracked_len(), hot.hot_len())
        };
        NodeStats {
            id: self.id(),
            state,
            size,
            used_bytes,
            evictions,
            tracked_keys,
            hot_keys,
            backup_entries: self.backups.len(),
        }
    }
}
