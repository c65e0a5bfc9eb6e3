//! Node Network Protocol
//!
//! Defines the HTTP endpoints and Data Transfer Objects exchanged between routers and cache
//! nodes (and between peer nodes for backup pushes).
//!
//! Bodies are JSON with camelCase field names; record field values travel as base64.
//! Status codes carry the outcome: 200 OK, 404 miss, 503 simulated failure (or not yet
//! bootstrapped), 400 bad request, 500 internal, 507 store full under `noeviction`.

use super::types::{EvictionPolicy, FailureMode, NodeId, NodeParams, Record};
use crate::error::NodeError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- API Endpoints ---

pub const ENDPOINT_GET: &str = "/get";
pub const ENDPOINT_GET_BACKUP: &str = "/get_backup";
pub const ENDPOINT_SET: &str = "/set";
pub const ENDPOINT_SET_BACKUP: &str = "/set_backup";
/// Peer-to-peer hot-key replication.
pub const ENDPOINT_PUSH_UPDATE: &str = "/push_update";
/// Simulated crash, driven by the failure injector.
pub const ENDPOINT_FAIL: &str = "/fail";
pub const ENDPOINT_RECOVER: &str = "/recover";
/// Liveness probe used by the router's recovery task.
pub const ENDPOINT_PING: &str = "/ping";
/// Bootstrap: seeds identity, memory ceiling, tick interval and peer list.
pub const ENDPOINT_NEW_NODE: &str = "/new_node";
pub const ENDPOINT_STATS: &str = "/stats";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRequest {
    pub key: String,
    /// Fields to return; empty means all.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBackupRequest {
    /// The failed primary whose backup entries should be consulted.
    pub origin_node_id: NodeId,
    pub key: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Body of a 200 reply to GET / GET-BACKUP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse {
    pub value: Record,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest {
    pub key: String,
    pub value: Record,
    /// Node that receives hot-key pushes for this key. `None` when the cluster has a
    /// single node.
    #[serde(default)]
    pub backup_node: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBackupRequest {
    pub origin_node_id: NodeId,
    pub key: String,
    pub value: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeResponse {
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpdateRequest {
    pub origin_node_id: NodeId,
    pub key: String,
    pub value: Record,
    /// The origin's access count, so the recipient treats the key as popular too.
    pub access_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn default_percentile() -> f64 {
    super::types::DEFAULT_HOT_KEY_PERCENTILE
}

fn default_true() -> bool {
    true
}

/// Bootstrap request sent by the router to every node at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNodeRequest {
    pub id: NodeId,
    pub max_mem_mbs: usize,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    /// Hot-key tick period, in seconds.
    pub update_interval_sec: f64,
    /// Addresses of every node in the cluster, indexed by node id (self included).
    pub peers: Vec<String>,
    #[serde(default = "default_percentile")]
    pub hot_key_percentile: f64,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default = "default_true")]
    pub backup_read_falls_back_to_primary: bool,
}

impl NewNodeRequest {
    /// Validates the request and turns it into node parameters.
    pub fn to_params(&self) -> Result<NodeParams, NodeError> {
        if !(self.hot_key_percentile > 0.0 && self.hot_key_percentile <= 1.0) {
            return Err(NodeError::BadRequest(format!(
                "hotKeyPercentile must be in (0, 1], got {}",
                self.hot_key_percentile
            )));
        }
        if !(self.update_interval_sec.is_finite() && self.update_interval_sec > 0.0) {
            return Err(NodeError::BadRequest(format!(
                "updateIntervalSec must be positive, got {}",
                self.update_interval_sec
            )));
        }
        if self.max_mem_mbs == 0 {
            return Err(NodeError::BadRequest("maxMemMbs must be positive".into()));
        }
        if !self.peers.is_empty() && self.id.index() >= self.peers.len() {
            return Err(NodeError::BadRequest(format!(
                "node id {} outside peer list of {}",
                self.id,
                self.peers.len()
            )));
        }

        let mut params = NodeParams::new(self.id);
        params.max_memory_bytes = self.max_mem_mbs * 1024 * 1024;
        params.eviction_policy = self.eviction_policy;
        params.tick_interval = Duration::from_secs_f64(self.update_interval_sec);
        params.hot_key_percentile = self.hot_key_percentile;
        params.failure_mode = self.failure_mode;
        params.backup_read_falls_back_to_primary = self.backup_read_falls_back_to_primary;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_wire_shape() {
        let req = SetRequest {
            key: "user:1".to_string(),
            value: Record::new().with_field("field0", b"hello".to_vec()),
            backup_node: Some(NodeId(2)),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "user:1",
                "value": { "field0": "aGVsbG8=" },
                "backupNode": 2
            })
        );
    }

    #[test]
    fn test_get_request_fields_default_to_all() {
        let req: GetRequest = serde_json::from_str(r#"{"key":"k"}"#).unwrap();
        assert!(req.fields.is_empty());
    }

    #[test]
    fn test_new_node_defaults_and_params() {
        let req: NewNodeRequest = serde_json::from_str(
            r#"{"id":1,"maxMemMbs":8,"evictionPolicy":"allkeys-random",
                "updateIntervalSec":0.5,"peers":["a:1","b:2"]}"#,
        )
        .unwrap();
        assert_eq!(req.hot_key_percentile, 0.01);
        assert_eq!(req.failure_mode, FailureMode::Unresponsive);

        let params = req.to_params().unwrap();
        assert_eq!(params.id, NodeId(1));
        assert_eq!(params.max_memory_bytes, 8 * 1024 * 1024);
        assert_eq!(params.eviction_policy, EvictionPolicy::AllKeysRandom);
        assert_eq!(params.tick_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_new_node_rejects_bad_percentile() {
        let req = NewNodeRequest {
            id: NodeId(0),
            max_mem_mbs: 1,
            eviction_policy: EvictionPolicy::AllKeysLru,
            update_interval_sec: 1.0,
            peers: vec![],
            hot_key_percentile: 1.5,
            failure_mode: FailureMode::Unresponsive,
            backup_read_falls_back_to_primary: true,
        };
        assert!(matches!(req.to_params(), Err(NodeError::BadRequest(_))));
    }

    #[test]
    fn test_malformed_base64_is_rejected() {
        let parsed: Result<SetRequest, _> =
            serde_json::from_str(r#"{"key":"k","value":{"f":"not base64!"}}"#);
        assert!(parsed.is_err());
    }
}
