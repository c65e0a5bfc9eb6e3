//! Router Module
//!
//! The client side of the cluster. A `CacheWrapper` owns one `NodeClient` per node and
//! turns GET/SET on a key into RPCs along that key's node sequence.
//!
//! ## Core Concepts
//! - **Health table**: per-node failed flag plus consecutive-timeout counter. Only
//!   timeouts (and transport errors) count; reaching `detect_threshold` flags the node.
//! - **Failover**: flagged nodes are skipped. Fallbacks receive GET-BACKUP / SET-BACKUP
//!   naming the key's primary as origin, never the primary verbs.
//! - **Recovery probe**: a background task PINGs flagged nodes every `probe_interval`
//!   and clears the flag on any non-timeout reply.
//! - **Bootstrap**: `CacheWrapper::bootstrap` seeds every node with NEW-NODE from a
//!   `ClusterConfig`.

pub mod bootstrap;
pub mod health;
pub mod probe;
pub mod types;
pub mod wrapper;


pub use health::HealthTable;
pub use types::{NodeHealth, RouterConfig};
pub use wrapper::CacheWrapper;
