//! Error Taxonomy
//!
//! Three layers of errors flow through the cluster:
//!
//! - **`NodeError`**: what a cache node reports about a single operation it executed.
//! - **`RpcError`**: what the router observes for one RPC to one node (the node's own
//!   error, or a transport-level failure on the way there).
//! - **`RouterError`**: what the caller of `CacheWrapper` gets back once the whole
//!   node sequence has been walked.
//!
//! A cache miss is never an error at any layer; reads return `Option<Record>`.

use crate::node::types::NodeId;

/// Failure reported by a cache node while executing an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The node is in the simulated `Failed` state.
    #[error("node is unavailable (simulated failure)")]
    Unavailable,

    /// No NEW-NODE has been received yet, so the node has no identity or store.
    #[error("node has not been bootstrapped")]
    NotBootstrapped,

    /// A `noeviction` store reached its memory ceiling.
    #[error("memory ceiling reached and eviction is disabled")]
    OutOfMemory,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of a single failed RPC, as seen by the caller of a `NodeClient`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The per-RPC deadline fired before the node answered.
    #[error("deadline exceeded")]
    Timeout,

    /// Connection refused/reset or any other failure below the protocol.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with the "simulated failed" status.
    #[error("node unavailable")]
    Unavailable,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal node error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller's cancellation signal fired.
    #[error("cancelled")]
    Cancelled,
}

impl RpcError {
    /// Whether this outcome feeds the router's consecutive-timeout detector.
    ///
    /// Transport errors are counted exactly like deadline expiry.
    pub fn counts_as_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout | RpcError::Transport(_))
    }
}

impl From<NodeError> for RpcError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Unavailable | NodeError::NotBootstrapped => RpcError::Unavailable,
            NodeError::OutOfMemory => RpcError::Internal(err.to_string()),
            NodeError::BadRequest(msg) => RpcError::BadRequest(msg),
            NodeError::Internal(msg) => RpcError::Internal(msg),
        }
    }
}

/// Error returned by `CacheWrapper` GET/SET.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// Every node in the key's sequence was skipped, timed out or unavailable.
    #[error("all nodes failed")]
    AllNodesFailed,

    #[error("request cancelled")]
    Cancelled,

    /// A node produced a terminal (non-failover) error.
    #[error("node {node} failed the request: {source}")]
    Rpc { node: NodeId, source: RpcError },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
