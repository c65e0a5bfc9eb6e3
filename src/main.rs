use anyhow::{Context, Result, bail};
use cache_cluster::client::http_connector;
use cache_cluster::config::ClusterConfig;
use cache_cluster::node::server::NodeServer;
use cache_cluster::node::types::NodeId;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// One cache node process.
///
/// Without `--config` the node waits for a router to send NEW-NODE. With `--config` and
/// `--id` it seeds itself from the cluster file.
#[derive(Debug, Parser)]
#[command(name = "cache-node", version, about)]
struct Args {
    /// Address to serve the node protocol on, e.g. 127.0.0.1:7000
    #[arg(long)]
    bind: SocketAddr,

    /// Cluster config (JSON) to self-bootstrap from
    #[arg(long, requires = "id")]
    config: Option<PathBuf>,

    /// This node's id in the cluster config
    #[arg(long, requires = "config")]
    id: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("Starting cache node on {}", args.bind);

    // 1. Node shell (peers resolve over HTTP):
    let server = NodeServer::new(args.bind.to_string(), http_connector());

    // 2. Optional self-bootstrap:
    if let (Some(path), Some(id)) = (&args.config, args.id) {
        let config = ClusterConfig::load(path)?;
        let Some(request) = config.new_node_request(NodeId(id)) else {
            bail!("node id {} is not in {}", id, path.display());
        };
        server
            .bootstrap(&request)
            .with_context(|| format!("bootstrapping node {} from {}", id, path.display()))?;
    } else {
        tracing::info!("Waiting for NEW-NODE from a router");
    }

    // 3. HTTP server until Ctrl+C:
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!("Press Ctrl+C to shutdown");

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await
}
