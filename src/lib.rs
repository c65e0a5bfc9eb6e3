//! Distributed Cache Cluster Library
//!
//! An in-memory caching layer that sits in front of a persistent backing store and keeps
//! serving reads when a single cache node goes down. Hot keys are opportunistically pushed
//! from their primary node to one designated backup, and clients fail over to that backup.
//!
//! ## Architecture Modules
//! - **`ring`**: Deterministic key → node-sequence mapping (primary first, then fallbacks).
//!   Uses a factorial permutation table for small clusters and a consistent-hashing ring
//!   for larger ones.
//! - **`node`**: The cache node. A bounded key-value store with an eviction policy, per-key
//!   access tracking, hot-key detection, a backup store for peers' hot entries, and the
//!   HTTP server exposing GET / GET-BACKUP / SET / SET-BACKUP / PUSH-UPDATE / FAIL /
//!   RECOVER / PING / NEW-NODE.
//! - **`client`**: The `NodeClient` capability trait and its HTTP and in-process
//!   implementations. Routers and nodes (for peer pushes) only ever talk through it.
//! - **`router`**: `CacheWrapper`, the client-side façade. Per-RPC deadlines, consecutive
//!   timeout detection, a recovery probe and request-level failover to backup stores.
//! - **`config`**: The cluster configuration record.
//! - **`metrics`**: The injected metrics sink. Optional; correctness never depends on it.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod ring;
pub mod router;

pub use client::NodeClient;
pub use config::ClusterConfig;
pub use error::{NodeError, RouterError, RpcError};
pub use node::types::{NodeId, Record};
pub use router::wrapper::CacheWrapper;
