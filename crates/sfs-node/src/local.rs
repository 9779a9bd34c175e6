//! Local node variant: direct volume I/O

use crate::xnode::XNode;
use async_trait::async_trait;
use sfs_common::{DigestAlgo, Error, HostPort, NodeId, Result, VolumeId};
use sfs_proto::{DigestBlob, HeaderBlob, ReadStreamBlob, WriteStreamBlob};
use sfs_volume::{VolumeError, VolumeStore};

/// The current process's own node
///
/// Services the protocol operations against the local volume store without
/// touching the network.
pub struct LocalNode {
    node_id: NodeId,
    address: HostPort,
    store: VolumeStore,
}

impl LocalNode {
    /// Bind this process's identity and store
    #[must_use]
    pub fn new(node_id: NodeId, address: HostPort, store: VolumeStore) -> Self {
        Self {
            node_id,
            address,
            store,
        }
    }

    /// The backing volume store
    #[must_use]
    pub fn store(&self) -> &VolumeStore {
        &self.store
    }
}

fn store_err(error: VolumeError) -> Error {
    Error::storage(error.to_string())
}

#[async_trait]
impl XNode for LocalNode {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn host_and_port(&self) -> &HostPort {
        &self.address
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> Result<Option<DigestBlob>> {
        self.store
            .checksum(volume, position, offset, length, algos)
            .await
            .map_err(store_err)
    }

    async fn delete(&self, volume: &VolumeId, position: u64) -> Result<Option<HeaderBlob>> {
        let marked = self.store.delete(volume, position).map_err(store_err)?;
        Ok(marked.map(|_| HeaderBlob::default()))
    }

    async fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>> {
        let marked = self
            .store
            .acknowledge(volume, position)
            .map_err(store_err)?;
        Ok(marked.map(|_| HeaderBlob::default()))
    }

    async fn can_put(&self, volume: &VolumeId) -> Result<bool> {
        self.store.can_put(volume).map_err(store_err)
    }

    async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<ReadStreamBlob>> {
        self.store
            .create_read_stream(volume, position, offset, length)
            .await
            .map_err(store_err)
    }

    async fn create_write_stream(
        &self,
        volume: &VolumeId,
        length: u64,
        algos: &[DigestAlgo],
    ) -> Result<WriteStreamBlob> {
        self.store
            .create_write_stream(volume, length, algos)
            .map_err(store_err)
    }
}
