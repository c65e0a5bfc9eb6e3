//! Node Server
//!
//! The process-level shell around a `CacheNode`. A node process starts empty and only
//! becomes a cluster member once a router sends NEW-NODE with its id, memory ceiling,
//! tick interval and peer list. A repeated NEW-NODE re-seeds the node from scratch.

use super::cache_node::CacheNode;
use super::handlers::routes;
use super::protocol::NewNodeRequest;
use crate::client::PeerConnector;
use crate::error::NodeError;

use anyhow::Result;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Bootstrapped {
    node: Arc<CacheNode>,
    ticker: JoinHandle<()>,
}

impl Drop for Bootstrapped {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

pub struct NodeServer {
    address: String,
    connector: PeerConnector,
    slot: RwLock<Option<Bootstrapped>>,
}

impl std::fmt::Debug for NodeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeServer")
            .field("address", &self.address)
            .field("bootstrapped", &self.slot.read().is_some())
            .finish_non_exhaustive()
    }
}

impl NodeServer {
    pub fn new(address: impl Into<String>, connector: PeerConnector) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            connector,
            slot: RwLock::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The live node, or `NotBootstrapped` before the first NEW-NODE.
    pub fn node(&self) -> Result<Arc<CacheNode>, NodeError> {
        self.slot
            .read()
            .as_ref()
            .map(|b| b.node.clone())
            .ok_or(NodeError::NotBootstrapped)
    }

    /// Applies NEW-NODE: builds a fresh node, resolves its peers and starts its tick.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bootstrap(&self, request: &NewNodeRequest) -> Result<Arc<CacheNode>, NodeError> {
        let params = request.to_params()?;
        let node = CacheNode::new(params);
        node.set_peers(
            request
                .peers
                .iter()
                .map(|address| (self.connector)(address))
                .collect(),
        );
        let ticker = node.start();

        tracing::info!(
            "Node {} bootstrapped at {} ({} MB, {:?}, tick {:?}, {} peers)",
            request.id,
            self.address,
            request.max_mem_mbs,
            request.eviction_policy,
            node.params().tick_interval,
            request.peers.len()
        );

        let previous = self.slot.write().replace(Bootstrapped {
            node: node.clone(),
            ticker,
        });
        if previous.is_some() {
            tracing::info!("Node at {} re-bootstrapped; previous state dropped", self.address);
        }
        Ok(node)
    }

    /// Serves the node protocol on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        tracing::info!("Node HTTP server listening on {}", local);

        axum::serve(listener, routes(self))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
