use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identity of a cache node: a dense index `0..N` that is static for the cluster's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cached value: a small mapping of named byte fields.
///
/// On the wire field values travel as base64 strings inside a JSON object. At rest the
/// record is stored as one bincode blob keyed by the record's key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<String, Vec<u8>>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for constructing records inline.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns only the requested fields. An empty list means "all fields".
    ///
    /// Requested fields the record does not carry are silently left out.
    pub fn project(&self, fields: &[String]) -> Record {
        if fields.is_empty() {
            return self.clone();
        }
        Record(
            fields
                .iter()
                .filter_map(|f| self.0.get_key_value(f.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Encodes the record into the self-describing blob kept by the KV store.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.0)
    }

    pub fn decode(blob: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(blob).map(Record)
    }
}

impl From<BTreeMap<String, Vec<u8>>> for Record {
    fn from(fields: BTreeMap<String, Vec<u8>>) -> Self {
        Record(fields)
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field, &BASE64.encode(value))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut fields = BTreeMap::new();
        for (field, value) in encoded {
            let bytes = BASE64
                .decode(value.as_bytes())
                .map_err(|e| D::Error::custom(format!("field {field:?}: {e}")))?;
            fields.insert(field, bytes);
        }
        Ok(Record(fields))
    }
}

/// What the KV store does once its memory ceiling is reached.
///
/// Names follow the familiar Redis `maxmemory-policy` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the least recently used key.
    #[default]
    #[serde(rename = "allkeys-lru", alias = "lru")]
    AllKeysLru,
    /// Evict a uniformly random key.
    #[serde(rename = "allkeys-random", alias = "random")]
    AllKeysRandom,
    /// Refuse writes that would exceed the ceiling.
    #[serde(rename = "noeviction", alias = "none")]
    NoEviction,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allkeys-lru" | "lru" => Ok(EvictionPolicy::AllKeysLru),
            "allkeys-random" | "random" => Ok(EvictionPolicy::AllKeysRandom),
            "noeviction" | "none" => Ok(EvictionPolicy::NoEviction),
            other => Err(format!("unknown eviction policy: {other}")),
        }
    }
}

/// How a node in the `Failed` state answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Never reply; the caller's deadline fires. Exercises timeout-based detection.
    #[default]
    Unresponsive,
    /// Reply promptly with the "unavailable" status.
    Unavailable,
}

/// Lifecycle state of a cache node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Ready,
    Failed,
}

pub const DEFAULT_HOT_KEY_PERCENTILE: f64 = 0.01;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_MEMORY_MB: usize = 64;

/// Runtime parameters of one cache node, seeded by NEW-NODE.
#[derive(Debug, Clone)]
pub struct NodeParams {
    pub id: NodeId,
    pub max_memory_bytes: usize,
    pub eviction_policy: EvictionPolicy,
    /// Period of the hot-key recompute / backup-push tick.
    pub tick_interval: Duration,
    /// Fraction of keys considered hot, in `(0, 1]`.
    pub hot_key_percentile: f64,
    pub failure_mode: FailureMode,
    /// On a GET-BACKUP miss, also look in this node's own primary store.
    pub backup_read_falls_back_to_primary: bool,
    /// Deadline for a single PUSH-UPDATE to a peer.
    pub push_timeout: Duration,
}

impl NodeParams {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            max_memory_bytes: DEFAULT_MAX_MEMORY_MB * 1024 * 1024,
            eviction_policy: EvictionPolicy::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            hot_key_percentile: DEFAULT_HOT_KEY_PERCENTILE,
            failure_mode: FailureMode::default(),
            backup_read_falls_back_to_primary: true,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

/// Result of a primary or backup read: the projected record (or a miss) plus the
/// node's current primary-store cardinality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub record: Option<Record>,
    pub size: usize,
}

/// Point-in-time view of a node, served on `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub id: NodeId,
    pub state: NodeState,
    pub size: usize,
    pub used_bytes: usize,
    pub evictions: u64,
    pub tracked_keys: usize,
    pub hot_keys: usize,
    pub backup_entries: usize,
}
