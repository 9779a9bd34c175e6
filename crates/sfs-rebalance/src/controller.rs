//! Per-segment rebalance controller

use crate::cluster::{Index, ReplicationPolicy};
use crate::planner::{CandidateNode, ReplicaGroupPlanner};
use crate::reader::SegmentReader;
use sfs_common::{BlobReference, BlobRole, DigestAlgo, Result, Segment, VolumeId};
use sfs_node::NodeDirectory;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Aligns a segment's verified copy counts with the cluster's expectations
///
/// A single entry point, [`rebalance`](Self::rebalance), runs the three
/// sub-operations (balance-up, balance-down of primaries, balance-down of
/// replicas) concurrently and applies their effects to the segment's
/// reference list afterwards, on the caller's task. A sub-operation failure
/// is logged and downgraded to "no change"; rebalancing is eventually
/// convergent and the segment will be revisited by the next sweep.
pub struct RebalanceController {
    policy: Arc<dyn ReplicationPolicy>,
    index: Arc<dyn Index>,
    directory: Arc<dyn NodeDirectory>,
    reader: SegmentReader,
}

impl RebalanceController {
    /// Wire the controller to its collaborators
    #[must_use]
    pub fn new(
        policy: Arc<dyn ReplicationPolicy>,
        index: Arc<dyn Index>,
        directory: Arc<dyn NodeDirectory>,
    ) -> Self {
        let reader = SegmentReader::new(directory.clone());
        Self {
            policy,
            index,
            directory,
            reader,
        }
    }

    /// Rebalance every segment in the slice; only the master sweeps
    ///
    /// Returns how many segments reported a change.
    pub async fn rebalance_segments(&self, segments: &mut [Segment]) -> usize {
        if !self.policy.is_master() {
            debug!("not the master, skipping rebalance sweep");
            return 0;
        }
        let mut changed = 0;
        for segment in segments.iter_mut() {
            if self.rebalance(segment).await {
                changed += 1;
            }
        }
        changed
    }

    /// Rebalance one segment; `true` when its reference list changed (or
    /// the segment is tiny-data and therefore stable by definition)
    ///
    /// # Panics
    ///
    /// Panics when the resolved expectations request zero copies; that is a
    /// configuration bug, not a runtime condition.
    pub async fn rebalance(&self, segment: &mut Segment) -> bool {
        if segment.tiny_data {
            return true;
        }

        let eligible_primaries = segment.eligible_indices(BlobRole::Primary);
        let eligible_replicas = segment.eligible_indices(BlobRole::Replica);

        let expected_primaries = i64::from(self.policy.number_of_primaries());
        let expected_replicas = i64::from(
            segment
                .container_replicas
                .unwrap_or_else(|| self.policy.number_of_replicas()),
        );
        assert!(
            expected_primaries + expected_replicas >= 1,
            "segment {} resolves to zero expected copies",
            segment.id
        );

        let delta_primaries = expected_primaries - eligible_primaries.len() as i64;
        let delta_replicas = expected_replicas - eligible_replicas.len() as i64;

        let surplus = |indices: &[usize]| -> Vec<(usize, BlobReference)> {
            indices
                .iter()
                .map(|&i| (i, segment.blobs[i].clone()))
                .collect()
        };
        let primary_refs = surplus(&eligible_primaries);
        let replica_refs = surplus(&eligible_replicas);
        let segment_id = segment.id.clone();

        let segment_view: &Segment = segment;
        let balance_up = async {
            if delta_primaries > 0 || delta_replicas > 0 {
                Some(
                    self.balance_up(
                        segment_view,
                        delta_primaries.max(0) as usize,
                        delta_replicas.max(0) as usize,
                    )
                    .await,
                )
            } else {
                None
            }
        };
        let down_primaries = async {
            if delta_primaries < 0 {
                self.balance_down(&segment_id, &primary_refs, (-delta_primaries) as usize)
                    .await
            } else {
                Vec::new()
            }
        };
        let down_replicas = async {
            if delta_replicas < 0 {
                self.balance_down(&segment_id, &replica_refs, (-delta_replicas) as usize)
                    .await
            } else {
                Vec::new()
            }
        };

        let (up_outcome, primary_marks, replica_marks) =
            tokio::join!(balance_up, down_primaries, down_replicas);

        // the sub-operations ran concurrently; their effects on the
        // reference list are applied here, serially
        for &idx in primary_marks.iter().chain(replica_marks.iter()) {
            segment.blobs[idx].deleted = true;
        }
        let up_changed = match up_outcome {
            None => false,
            Some(Ok(new_refs)) => {
                let changed = !new_refs.is_empty();
                segment.blobs.extend(new_refs);
                changed
            }
            Some(Err(e)) => {
                error!(
                    segment = %segment.id,
                    kind = e.kind(),
                    error = %e,
                    "balance-up failed"
                );
                false
            }
        };

        up_changed || !primary_marks.is_empty() || !replica_marks.is_empty()
    }

    /// Delete surplus copies, earliest reference first
    ///
    /// Stops strictly once `delta` deletions have succeeded. Individual
    /// delete failures are logged and skipped; whatever was deleted before a
    /// failure stays deleted.
    async fn balance_down(
        &self,
        segment_id: &str,
        refs: &[(usize, BlobReference)],
        delta: usize,
    ) -> Vec<usize> {
        assert!(delta > 0, "balance-down requires a positive delta");
        assert!(
            refs.len() >= delta,
            "balance-down cannot delete more copies than exist"
        );

        let mut marked = Vec::with_capacity(delta);
        for (idx, blob) in refs {
            if marked.len() == delta {
                break;
            }
            match self.index.delete_blob_reference(blob).await {
                Ok(true) => marked.push(*idx),
                Ok(false) => debug!(
                    segment = segment_id,
                    volume = %blob.volume_id,
                    position = blob.position,
                    "delete declined by index"
                ),
                Err(e) => error!(
                    segment = segment_id,
                    volume = %blob.volume_id,
                    position = blob.position,
                    kind = e.kind(),
                    error = %e,
                    "delete failed"
                ),
            }
        }
        marked
    }

    /// Write missing copies by teeing one healthy source across new targets
    ///
    /// Returns the references to append; they are created un-acked on
    /// purpose. Acking here, out of band from the index update, would let a
    /// volume believe a blob is persisted while the index has no record of
    /// it; un-acked bytes stay reclaimable if the bulk index write fails.
    async fn balance_up(
        &self,
        segment: &Segment,
        primaries: usize,
        replicas: usize,
    ) -> Result<Vec<BlobReference>> {
        let roster = self.index.list_data_nodes().await?;
        self.directory.update_roster(&roster);

        let Some(source) = self.reader.segment_read_stream(segment, true).await else {
            debug!(
                segment = %segment.id,
                "no readable copy, deferring balance-up to the next sweep"
            );
            return Ok(Vec::new());
        };

        let used = segment.used_volume_ids();
        let mut candidates = Vec::new();
        for def in &roster {
            if !def.data_node {
                continue;
            }
            let volumes: Vec<VolumeId> = def
                .usable_volumes()
                .filter(|v| !used.contains(&v.volume_id))
                .map(|v| v.volume_id.clone())
                .collect();
            if volumes.is_empty() {
                continue;
            }
            candidates.push(CandidateNode {
                node: self.directory.lookup(&def.node_id)?,
                volumes,
            });
        }

        let planner = ReplicaGroupPlanner::new(self.policy.allow_same_node());
        let length = source.length();
        let copies = planner
            .place_and_write(&candidates, primaries, replicas, length, source.into_stream())
            .await?;

        let mut new_refs = Vec::with_capacity(copies.len());
        for copy in copies {
            let digest = copy.receipt.digest_bytes(DigestAlgo::Sha512)?;
            new_refs.push(BlobReference {
                volume_id: copy.receipt.volume.clone(),
                position: copy.receipt.position,
                length: copy.receipt.length,
                token_digests: BTreeMap::from([(DigestAlgo::Sha512, digest)]),
                role: copy.receipt.role(),
                verify_fail_count: 0,
                acked: false,
                deleted: false,
            });
        }
        debug!(
            segment = %segment.id,
            appended = new_refs.len(),
            "balance-up wrote new copies"
        );
        Ok(new_refs)
    }
}
