use super::{NodeClient, PeerConnector};
use crate::error::RpcError;
use crate::node::cache_node::CacheNode;
use crate::node::protocol::NewNodeRequest;
use crate::node::server::NodeServer;
use crate::node::types::{NodeId, Record};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// In-process client for a `NodeServer` living in the same runtime.
#[derive(Debug, Clone)]
pub struct LocalNodeClient {
    address: String,
    server: Weak<NodeServer>,
}

impl LocalNodeClient {
    pub fn new(server: &Arc<NodeServer>) -> Self {
        Self {
            address: server.address().to_string(),
            server: Arc::downgrade(server),
        }
    }

    /// A client whose server may not exist yet. Resolves lazily per call.
    fn detached(address: &str, server: Weak<NodeServer>) -> Self {
        Self {
            address: address.to_string(),
            server,
        }
    }

    fn server(&self) -> Result<Arc<NodeServer>, RpcError> {
        self.server
            .upgrade()
            .ok_or_else(|| RpcError::Transport(format!("{} is gone", self.address)))
    }

    fn node(&self) -> Result<Arc<CacheNode>, RpcError> {
        Ok(self.server()?.node()?)
    }
}

#[async_trait]
impl NodeClient for LocalNodeClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, key: &str, fields: &[String]) -> Result<Option<Record>, RpcError> {
        Ok(self.node()?.get(key, fields).await?.record)
    }

    async fn get_backup(
        &self,
        origin: NodeId,
        key: &str,
        fields: &[String],
    ) -> Result<Option<Record>, RpcError> {
        Ok(self.node()?.get_backup(origin, key, fields).await?.record)
    }

    async fn set(
        &self,
        key: &str,
        value: &Record,
        backup: Option<NodeId>,
    ) -> Result<usize, RpcError> {
        Ok(self
            .node()?
            .set(key.to_string(), value.clone(), backup)
            .await?)
    }

    async fn set_backup(
        &self,
        origin: NodeId,
        key: &str,
        value: &Record,
    ) -> Result<usize, RpcError> {
        Ok(self
            .node()?
            .set_backup(origin, key.to_string(), value.clone())
            .await?)
    }

    async fn push_update(
        &self,
        origin: NodeId,
        key: &str,
        value: &Record,
        access_count: u64,
    ) -> Result<(), RpcError> {
        Ok(self
            .node()?
            .push_update(origin, key.to_string(), value.clone(), access_count)
            .await?)
    }

    async fn fail(&self) -> Result<(), RpcError> {
        self.node()?.fail();
        Ok(())
    }

    async fn recover(&self) -> Result<(), RpcError> {
        self.node()?.recover();
        Ok(())
    }

    async fn ping(&self) -> Result<(), RpcError> {
        Ok(self.node()?.ping().await?)
    }

    async fn new_node(&self, request: &NewNodeRequest) -> Result<(), RpcError> {
        self.server()?.bootstrap(request)?;
        Ok(())
    }
}

/// Registry of in-process node servers keyed by address, standing in for the network.
#[derive(Debug, Default)]
pub struct LocalDirectory {
    servers: DashMap<String, Weak<NodeServer>>,
}

impl LocalDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a server at `address` whose peers resolve through this directory.
    /// The caller owns the returned server; the directory only keeps a weak handle.
    pub fn add_server(self: &Arc<Self>, address: &str) -> Arc<NodeServer> {
        let server = NodeServer::new(address, self.connector());
        self.servers
            .insert(address.to_string(), Arc::downgrade(&server));
        server
    }

    pub fn client(&self, address: &str) -> Arc<dyn NodeClient> {
        let server = self
            .servers
            .get(address)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Arc::new(LocalNodeClient::detached(address, server))
    }

    pub fn connector(self: &Arc<Self>) -> PeerConnector {
        let directory = Arc::downgrade(self);
        Arc::new(move |address: &str| match directory.upgrade() {
            Some(directory) => directory.client(address),
            None => Arc::new(LocalNodeClient::detached(address, Weak::new())) as Arc<dyn NodeClient>,
        })
    }
}
