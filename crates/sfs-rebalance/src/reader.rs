//! Segment reader: locate any healthy copy and open it

use sfs_common::{BlobReference, BlobRole, Segment};
use sfs_node::NodeDirectory;
use sfs_proto::ReadStreamBlob;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens a byte source for an existing segment
///
/// Candidates are tried in order: eligible primaries, then eligible
/// replicas; the first open stream wins. With `prefer_verified` unset,
/// unverified (but undeleted) references are tried last as well.
pub struct SegmentReader {
    directory: Arc<dyn NodeDirectory>,
}

impl SegmentReader {
    /// Create a reader resolving copies through the directory
    #[must_use]
    pub fn new(directory: Arc<dyn NodeDirectory>) -> Self {
        Self { directory }
    }

    /// Open a read stream for the segment, if any copy is reachable
    pub async fn segment_read_stream(
        &self,
        segment: &Segment,
        prefer_verified: bool,
    ) -> Option<ReadStreamBlob> {
        let mut candidates: Vec<&BlobReference> = Vec::new();
        for role in [BlobRole::Primary, BlobRole::Replica] {
            candidates.extend(
                segment
                    .blobs
                    .iter()
                    .filter(|b| b.role == role && b.is_eligible()),
            );
        }
        if !prefer_verified {
            candidates.extend(
                segment
                    .blobs
                    .iter()
                    .filter(|b| !b.is_eligible() && !b.deleted),
            );
        }

        for blob in candidates {
            let Some(node) = self.directory.owner_of(&blob.volume_id) else {
                warn!(
                    segment = %segment.id,
                    volume = %blob.volume_id,
                    "no node owns the copy's volume"
                );
                continue;
            };
            match node
                .create_read_stream(&blob.volume_id, blob.position, None, None)
                .await
            {
                Ok(Some(stream)) => return Some(stream),
                Ok(None) => {
                    debug!(
                        segment = %segment.id,
                        volume = %blob.volume_id,
                        position = blob.position,
                        "copy absent on its volume"
                    );
                }
                Err(e) => {
                    warn!(
                        segment = %segment.id,
                        volume = %blob.volume_id,
                        kind = e.kind(),
                        error = %e,
                        "read candidate failed"
                    );
                }
            }
        }
        None
    }
}
