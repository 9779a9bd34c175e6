//! Remote node variant: thin wrapper over the protocol client

use crate::xnode::XNode;
use async_trait::async_trait;
use sfs_client::RemoteBlobClient;
use sfs_common::{DigestAlgo, HostPort, NodeId, Result, VolumeId};
use sfs_proto::{DigestBlob, HeaderBlob, ReadStreamBlob, WriteStreamBlob};

/// A peer node reached over the blob protocol
pub struct RemoteNode {
    node_id: NodeId,
    address: HostPort,
    client: RemoteBlobClient,
}

impl RemoteNode {
    /// Bind a peer's identity to a protocol client
    #[must_use]
    pub fn new(node_id: NodeId, address: HostPort, client: RemoteBlobClient) -> Self {
        Self {
            node_id,
            address,
            client,
        }
    }
}

#[async_trait]
impl XNode for RemoteNode {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn host_and_port(&self) -> &HostPort {
        &self.address
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> Result<Option<DigestBlob>> {
        self.client
            .checksum(volume, position, offset, length, algos)
            .await
    }

    async fn delete(&self, volume: &VolumeId, position: u64) -> Result<Option<HeaderBlob>> {
        self.client.delete(volume, position).await
    }

    async fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>> {
        self.client.acknowledge(volume, position).await
    }

    async fn can_put(&self, volume: &VolumeId) -> Result<bool> {
        self.client.can_put(volume).await
    }

    async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<ReadStreamBlob>> {
        self.client
            .create_read_stream(volume, position, offset, length)
            .await
    }

    async fn create_write_stream(
        &self,
        volume: &VolumeId,
        length: u64,
        algos: &[DigestAlgo],
    ) -> Result<WriteStreamBlob> {
        self.client.create_write_stream(volume, length, algos).await
    }
}
