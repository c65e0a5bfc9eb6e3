//! Recovery probe: every `probe_interval`, PING each node the router believes failed and
//! clear the flag of any node that answers with anything but a timeout.
//!
//! A PING waits at most `min(cache_timeout, probe_interval)`, so one round never overlaps
//! the next and a node that comes back is seen within a single interval.

use super::wrapper::RouterCore;
use crate::node::types::NodeId;

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the probe loop. It holds a weak handle and exits once the router is gone.
pub(crate) fn spawn(core: &Arc<RouterCore>) -> JoinHandle<()> {
    let router = Arc::downgrade(core);
    let period = core.config.probe_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(core) = router.upgrade() else {
                break;
            };
            probe_failed(&core).await;
        }
    })
}

/// One probe round over all flagged nodes, concurrently. Returns the nodes recovered.
pub(crate) async fn probe_failed(core: &RouterCore) -> Vec<NodeId> {
    let failed = core.health.failed_nodes();
    if failed.is_empty() {
        return Vec::new();
    }

    let deadline = core.config.cache_timeout.min(core.config.probe_interval);
    let probes = failed.into_iter().map(|node| async move {
        let reply = match core.nodes.get(node.index()) {
            Some(client) => tokio::time::timeout(deadline, client.ping()).await,
            None => return (node, false),
        };
        let alive = match reply {
            Ok(Ok(())) => true,
            Ok(Err(e)) => !e.counts_as_timeout(),
            Err(_) => false,
        };
        (node, alive)
    });

    let mut recovered = Vec::new();
    for (node, alive) in join_all(probes).await {
        if alive && core.health.mark_recovered(node) {
            tracing::info!("Node {} answered probe; routing to it again", node);
            core.metrics.node_recovered(node);
            recovered.push(node);
        }
    }
    recovered
}
