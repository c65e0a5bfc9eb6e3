//! Cache Node Module
//!
//! Everything that runs inside one cache node process.
//!
//! ## Core Concepts
//! - **Primary store**: `KvStore`, a memory-bounded map from key to record blob with a
//!   configurable eviction policy. Evictions are silent.
//! - **Hot keys**: `HotKeyTracker` counts accesses and recomputes the top-percentile set
//!   every tick.
//! - **Backup store**: `BackupStore` keeps hot entries pushed by peers, per origin node, so
//!   this node can answer reads for a failed primary.
//! - **Lifecycle**: `CacheNode` is `Ready` or `Failed`; FAIL flushes all state, RECOVER
//!   re-initialises it.
//! - **Transport**: `NodeServer` + `handlers` expose the node over HTTP/JSON.

pub mod backup;
pub mod cache_node;
pub mod handlers;
pub mod hotkeys;
pub mod protocol;
pub mod server;
pub mod store;
pub mod types;
