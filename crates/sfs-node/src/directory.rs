//! Node directory: id-to-node resolution

use crate::local::LocalNode;
use crate::remote::RemoteNode;
use crate::xnode::XNode;
use parking_lot::RwLock;
use sfs_client::RemoteBlobClient;
use sfs_common::{ClientConfig, Error, NodeId, Result, ServiceDef, VolumeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Resolves node and volume identities to node handles
///
/// The lookup decides once whether an id is this process (local volume I/O)
/// or a peer (protocol client); everything downstream stays polymorphic.
pub trait NodeDirectory: Send + Sync {
    /// Resolve a node id
    fn lookup(&self, node_id: &NodeId) -> Result<Arc<dyn XNode>>;

    /// Resolve the node owning a volume
    fn owner_of(&self, volume: &VolumeId) -> Option<Arc<dyn XNode>>;

    /// Absorb a fresh roster snapshot
    fn update_roster(&self, roster: &[ServiceDef]);
}

/// Directory backed by roster snapshots from the index
///
/// Remote handles are cached per node id so all operations against one peer
/// share a client; every client shares the one process-wide HTTP pool.
pub struct ClusterDirectory {
    http: reqwest::Client,
    secret: Vec<u8>,
    response_timeout: Duration,
    local: Option<Arc<LocalNode>>,
    nodes: RwLock<HashMap<NodeId, Arc<dyn XNode>>>,
    owners: RwLock<HashMap<VolumeId, NodeId>>,
}

impl ClusterDirectory {
    /// Create a directory; `local` is this process's node, if it stores data
    pub fn new(config: &ClientConfig, local: Option<LocalNode>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::storage(format!("http client: {e}")))?;
        Ok(Self {
            http,
            secret: config.remote_node_secret.as_bytes().to_vec(),
            response_timeout: config.response_timeout(),
            local: local.map(Arc::new),
            nodes: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        })
    }

    fn make_node(&self, def: &ServiceDef) -> Arc<dyn XNode> {
        if let Some(local) = &self.local
            && local.node_id() == &def.node_id
        {
            return local.clone();
        }
        let client = RemoteBlobClient::new(
            self.http.clone(),
            def.node_id.clone(),
            &def.address,
            &self.secret,
            self.response_timeout,
        );
        Arc::new(RemoteNode::new(
            def.node_id.clone(),
            def.address.clone(),
            client,
        ))
    }
}

impl NodeDirectory for ClusterDirectory {
    fn lookup(&self, node_id: &NodeId) -> Result<Arc<dyn XNode>> {
        self.nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    fn owner_of(&self, volume: &VolumeId) -> Option<Arc<dyn XNode>> {
        let node_id = self.owners.read().get(volume).cloned()?;
        self.lookup(&node_id).ok()
    }

    fn update_roster(&self, roster: &[ServiceDef]) {
        let mut nodes = self.nodes.write();
        let mut owners = self.owners.write();
        owners.clear();
        for def in roster {
            let reuse = nodes
                .get(&def.node_id)
                .is_some_and(|n| n.host_and_port() == &def.address);
            if !reuse {
                info!(node = %def.node_id, address = %def.address, "registering node");
                nodes.insert(def.node_id.clone(), self.make_node(def));
            }
            for volume in &def.volumes {
                owners.insert(volume.volume_id.clone(), def.node_id.clone());
            }
        }
        nodes.retain(|id, _| roster.iter().any(|d| &d.node_id == id));
    }
}
