//! The node capability trait

use async_trait::async_trait;
use sfs_common::{DigestAlgo, HostPort, NodeId, Result, VolumeId};
use sfs_proto::{DigestBlob, HeaderBlob, ReadStreamBlob, WriteStreamBlob};

/// Capability surface of one cluster node
///
/// Mirrors the `/blob/001` protocol operation for operation; see the client
/// crate for the status and envelope mappings. Implementations must keep
/// `Option`/error semantics identical across variants so callers stay
/// polymorphic.
#[async_trait]
pub trait XNode: Send + Sync {
    /// Stable node identity
    fn node_id(&self) -> &NodeId;

    /// Network endpoint of the node's blob protocol
    fn host_and_port(&self) -> &HostPort;

    /// Whether operations resolve to this process's own volumes
    fn is_local(&self) -> bool;

    /// Compute digests over a stored blob or a window of it
    async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> Result<Option<DigestBlob>>;

    /// Mark a blob deleted; `None` when already absent or unmodifiable
    async fn delete(&self, volume: &VolumeId, position: u64) -> Result<Option<HeaderBlob>>;

    /// Mark a blob acknowledged; status mapping identical to `delete`
    async fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>>;

    /// Probe whether the volume accepts a new blob
    async fn can_put(&self, volume: &VolumeId) -> Result<bool>;

    /// Open a read stream over a stored blob
    async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<ReadStreamBlob>>;

    /// Open a write stream of `length` bytes on the volume
    async fn create_write_stream(
        &self,
        volume: &VolumeId,
        length: u64,
        algos: &[DigestAlgo],
    ) -> Result<WriteStreamBlob>;
}
