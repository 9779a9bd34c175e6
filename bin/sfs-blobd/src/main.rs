//! SFS Blob Daemon
//!
//! Serves this node's volumes to the cluster over the `/blob/001` peer
//! protocol.

mod service;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use serde::Deserialize;
use service::AppState;
use sfs_common::NodeId;
use sfs_volume::{VolumeSpec, VolumeStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sfs-blobd")]
#[command(about = "SFS blob protocol daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/sfs/blobd.toml")]
    config: String,

    /// Listen address for the blob protocol
    #[arg(short, long)]
    listen: Option<String>,

    /// Node id advertised to the cluster
    #[arg(long)]
    node_id: Option<String>,

    /// Data directory holding the volume files
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    node: NodeConfig,
    #[serde(default)]
    cluster: ClusterConfig,
    #[serde(default)]
    storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
struct NodeConfig {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default = "default_listen")]
    listen: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ClusterConfig {
    /// Shared secret; peers present it base64-encoded on every request
    #[serde(default)]
    remote_node_secret: String,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    volumes: Vec<VolumeSpec>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            volumes: Vec::new(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9210".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/sfs/blobs")
}

fn load_config(path: &str) -> Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("SFS_BLOBD").separator("__"))
        .build()
        .context("loading configuration")?;
    settings
        .try_deserialize()
        .context("deserializing configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "sfs_blobd={0},sfs_volume={0},tower_http=warn",
                    args.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_config(&args.config)?;
    if let Some(listen) = args.listen {
        config.node.listen = listen;
    }
    if let Some(node_id) = args.node_id {
        config.node.node_id = Some(node_id);
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = PathBuf::from(data_dir);
    }

    let Some(node_id) = config.node.node_id else {
        bail!("no node id configured (set node.node_id or pass --node-id)");
    };
    let node_id =
        NodeId::new(node_id).map_err(|e| anyhow::anyhow!("invalid node id: {e}"))?;
    if config.storage.volumes.is_empty() {
        bail!("no volumes configured under [[storage.volumes]]");
    }
    if config.cluster.remote_node_secret.is_empty() {
        bail!("no cluster secret configured under cluster.remote_node_secret");
    }

    let store = VolumeStore::open(&config.storage.data_dir, &config.storage.volumes)
        .context("opening volume store")?;
    info!(
        node = %node_id,
        volumes = config.storage.volumes.len(),
        data_dir = %config.storage.data_dir.display(),
        "volume store ready"
    );

    let state = Arc::new(AppState {
        node_id,
        store,
        token: BASE64.encode(config.cluster.remote_node_secret.as_bytes()),
    });

    let addr: SocketAddr = config
        .node
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.node.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "blob protocol listening");

    axum::serve(listener, service::router(state))
        .await
        .context("serving blob protocol")?;
    Ok(())
}
