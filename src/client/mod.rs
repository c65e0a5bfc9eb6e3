//! Node Client Module
//!
//! The single capability set through which anything talks to a cache node: the router for
//! GET/SET traffic, recovery probes and bootstrap, and nodes themselves for peer pushes.
//!
//! ## Implementations
//! - **`HttpNodeClient`**: JSON over HTTP with a pooled keep-alive `reqwest::Client`.
//! - **`LocalNodeClient`**: In-process calls into a `NodeServer` through a weak handle.
//!   Used by tests and embedded clusters; behaves exactly like the remote path, including
//!   the unresponsive failure mode.
//!
//! Clients apply no deadlines of their own. The caller (router or push task) wraps every
//! call in its deadline and drops the call future when it fires, which releases the
//! underlying connection or task.

pub mod http;
pub mod local;

use crate::error::RpcError;
use crate::node::protocol::NewNodeRequest;
use crate::node::types::{NodeId, Record};

use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpNodeClient;
pub use local::{LocalDirectory, LocalNodeClient};

#[async_trait]
pub trait NodeClient: Send + Sync + std::fmt::Debug {
    /// Human-readable address, for logs.
    fn address(&self) -> &str;

    /// Primary read. `Ok(None)` is a miss.
    async fn get(&self, key: &str, fields: &[String]) -> Result<Option<Record>, RpcError>;

    /// Read from this node's backup store for `origin`.
    async fn get_backup(
        &self,
        origin: NodeId,
        key: &str,
        fields: &[String],
    ) -> Result<Option<Record>, RpcError>;

    /// Primary write. Returns the node's primary-store cardinality.
    async fn set(
        &self,
        key: &str,
        value: &Record,
        backup: Option<NodeId>,
    ) -> Result<usize, RpcError>;

    /// Direct write into this node's backup store for `origin`.
    async fn set_backup(&self, origin: NodeId, key: &str, value: &Record)
    -> Result<usize, RpcError>;

    async fn push_update(
        &self,
        origin: NodeId,
        key: &str,
        value: &Record,
        access_count: u64,
    ) -> Result<(), RpcError>;

    async fn fail(&self) -> Result<(), RpcError>;

    async fn recover(&self) -> Result<(), RpcError>;

    async fn ping(&self) -> Result<(), RpcError>;

    async fn new_node(&self, request: &NewNodeRequest) -> Result<(), RpcError>;
}

/// Resolves a peer address into a client. Nodes use it at bootstrap to turn the NEW-NODE
/// peer list into push targets.
pub type PeerConnector = Arc<dyn Fn(&str) -> Arc<dyn NodeClient> + Send + Sync>;

/// Connector producing `HttpNodeClient`s that share one connection pool.
pub fn http_connector() -> PeerConnector {
    let pool = reqwest::Client::new();
    Arc::new(move |address: &str| {
        Arc::new(HttpNodeClient::with_client(address, pool.clone())) as Arc<dyn NodeClient>
    })
}
