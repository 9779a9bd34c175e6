//! Collaborator interfaces consumed by the rebalance core

use async_trait::async_trait;
use sfs_common::{BlobReference, ReplicationConfig, Result, ServiceDef};

/// Cluster-wide replication requirements
pub trait ReplicationPolicy: Send + Sync {
    /// Expected primary copies per segment
    fn number_of_primaries(&self) -> u32;

    /// Default replica copies per segment; containers may override
    fn number_of_replicas(&self) -> u32;

    /// Whether one node may hold several copies on distinct volumes
    fn allow_same_node(&self) -> bool;

    /// Whether this process currently runs the rebalance sweep
    fn is_master(&self) -> bool;
}

/// Replication policy resolved from static configuration
pub struct ConfiguredReplication {
    config: ReplicationConfig,
    master: bool,
}

impl ConfiguredReplication {
    /// Bind a configuration snapshot and this process's master flag
    #[must_use]
    pub fn new(config: ReplicationConfig, master: bool) -> Self {
        Self { config, master }
    }
}

impl ReplicationPolicy for ConfiguredReplication {
    fn number_of_primaries(&self) -> u32 {
        self.config.number_of_primaries
    }

    fn number_of_replicas(&self) -> u32 {
        self.config.number_of_replicas
    }

    fn allow_same_node(&self) -> bool {
        self.config.allow_same_node
    }

    fn is_master(&self) -> bool {
        self.master
    }
}

/// The object-metadata index, as far as this core needs it
///
/// The index owns segment persistence and the acknowledge flow; the core
/// only lists candidate nodes and hands over physical deletions.
#[async_trait]
pub trait Index: Send + Sync {
    /// Snapshot of the data-node roster at call time
    async fn list_data_nodes(&self) -> Result<Vec<ServiceDef>>;

    /// Delete one blob copy and acknowledge the deletion at the index layer
    ///
    /// `Ok(true)` means the copy is gone (or was already gone) and the
    /// reference may be marked deleted.
    async fn delete_blob_reference(&self, blob: &BlobReference) -> Result<bool>;
}
