use std::time::Duration;

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(2000);
/// Deliberately large: the router flags a node statistically under load, not on one miss.
pub const DEFAULT_DETECT_THRESHOLD: u32 = 1000;
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Router behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// When false the primary is the only node ever tried.
    pub reconfigure_enabled: bool,
    /// Per-RPC deadline.
    pub cache_timeout: Duration,
    /// Consecutive timeouts that flag a node failed.
    pub detect_threshold: u32,
    pub probe_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            reconfigure_enabled: true,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            detect_threshold: DEFAULT_DETECT_THRESHOLD,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Router-side view of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeHealth {
    pub failed: bool,
    pub consecutive_timeouts: u32,
}
