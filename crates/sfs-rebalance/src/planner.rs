//! Replica group planner
//!
//! Given candidate nodes with their remaining eligible volumes, selects
//! write targets, opens one write stream per target, and drives them all
//! from a single source via a tee. The group succeeds only as a whole: any
//! stream failure or digest disagreement aborts every target.

use sfs_common::{BlobRole, DigestAlgo, Error, Result, VolumeId};
use sfs_proto::DigestBlob;
use sfs_stream::{ByteSink, ByteStream, combine_delay_error, tee};
use sfs_node::XNode;
use std::sync::Arc;
use tracing::debug;

/// One candidate node with the volumes still open to this segment
///
/// Volumes already used by the segment have been filtered out by the
/// caller; order is the roster's.
pub struct CandidateNode {
    /// The node to probe and, if accepted, write to
    pub node: Arc<dyn XNode>,
    /// Remaining eligible volumes, in advertised order
    pub volumes: Vec<VolumeId>,
}

/// One successfully written copy
pub struct PlacedCopy {
    /// The node holding the new copy
    pub node: Arc<dyn XNode>,
    /// Write receipt with role flags set from assignment order
    pub receipt: DigestBlob,
}

impl std::fmt::Debug for PlacedCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacedCopy")
            .field("node", self.node.node_id())
            .field("receipt", &self.receipt)
            .finish()
    }
}

/// Plans and executes one replica group write
pub struct ReplicaGroupPlanner {
    allow_same_node: bool,
}

impl ReplicaGroupPlanner {
    /// Create a planner
    #[must_use]
    pub fn new(allow_same_node: bool) -> Self {
        Self { allow_same_node }
    }

    /// Write `primaries + replicas` copies of `source` across the candidates
    ///
    /// Targets are assigned in probe order: the first `primaries` successful
    /// probes become primary copies, the rest replicas. Fails with
    /// `InsufficientCapacity` when not enough probes succeed, and with
    /// `DigestMismatch` when the receipts disagree; in both cases no partial
    /// success is returned.
    pub async fn place_and_write(
        &self,
        candidates: &[CandidateNode],
        primaries: usize,
        replicas: usize,
        length: u64,
        source: ByteStream,
    ) -> Result<Vec<PlacedCopy>> {
        let need = primaries + replicas;
        if need == 0 {
            return Ok(Vec::new());
        }

        let targets = self.assign_targets(candidates, need).await;
        if targets.len() < need {
            return Err(Error::InsufficientCapacity {
                requested: need,
                obtained: targets.len(),
            });
        }

        let mut sinks: Vec<Box<dyn ByteSink>> = Vec::with_capacity(need);
        let mut receipts = Vec::with_capacity(need);
        for (node, volume) in &targets {
            let stream = node
                .create_write_stream(volume, length, &[DigestAlgo::Sha512])
                .await?;
            let (sink, receipt) = stream.into_parts();
            sinks.push(sink);
            receipts.push(receipt);
        }

        // receipts settle in any order while the tee runs; join_all restores
        // target order and combine delays either side's failure until both
        // have settled. The sinks are dropped as soon as the tee finishes:
        // on failure that aborts every in-flight write stream, which is what
        // lets the receipt side settle at all.
        let tee_all = async move {
            let mut sinks = sinks;
            let result = {
                let mut refs: Vec<&mut dyn ByteSink> =
                    sinks.iter_mut().map(|s| s.as_mut()).collect();
                tee(source, &mut refs).await
            };
            drop(sinks);
            result
        };
        let collect_receipts = async {
            futures::future::join_all(receipts)
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()
        };
        let receipts =
            combine_delay_error(tee_all, collect_receipts, |_copied, receipts| receipts)
                .await?;

        self.verify_digests(&targets, &receipts)?;

        Ok(targets
            .into_iter()
            .zip(receipts)
            .enumerate()
            .map(|(i, ((node, _), mut receipt))| {
                receipt.set_role(if i < primaries {
                    BlobRole::Primary
                } else {
                    BlobRole::Replica
                });
                PlacedCopy { node, receipt }
            })
            .collect())
    }

    /// Walk candidates, probing volumes until `need` targets are assigned
    ///
    /// Failed probes are skipped; without `allow_same_node` only a node's
    /// first eligible volume is considered.
    async fn assign_targets(
        &self,
        candidates: &[CandidateNode],
        need: usize,
    ) -> Vec<(Arc<dyn XNode>, VolumeId)> {
        let mut targets: Vec<(Arc<dyn XNode>, VolumeId)> = Vec::new();
        'candidates: for candidate in candidates {
            if targets.len() == need {
                break;
            }
            if self.allow_same_node {
                for volume in &candidate.volumes {
                    if targets.len() == need {
                        break 'candidates;
                    }
                    if probe(candidate, volume).await {
                        targets.push((candidate.node.clone(), volume.clone()));
                    }
                }
            } else {
                let Some(volume) = candidate.volumes.first() else {
                    continue;
                };
                if probe(candidate, volume).await {
                    targets.push((candidate.node.clone(), volume.clone()));
                }
            }
        }
        targets
    }

    fn verify_digests(
        &self,
        targets: &[(Arc<dyn XNode>, VolumeId)],
        receipts: &[DigestBlob],
    ) -> Result<()> {
        let mut digests = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            let digest = receipt.digest_hex(DigestAlgo::Sha512).ok_or_else(|| {
                Error::protocol_body("", "write receipt lacks sha512 digest")
            })?;
            digests.push(digest.to_string());
        }
        if digests.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(Error::DigestMismatch {
                targets: targets
                    .iter()
                    .map(|(node, volume)| format!("{}/{volume}", node.node_id()))
                    .collect(),
                digests,
            });
        }
        Ok(())
    }
}

async fn probe(candidate: &CandidateNode, volume: &VolumeId) -> bool {
    match candidate.node.can_put(volume).await {
        Ok(accepted) => accepted,
        Err(e) => {
            debug!(
                node = %candidate.node.node_id(),
                volume = %volume,
                kind = e.kind(),
                error = %e,
                "can_put probe failed, skipping"
            );
            false
        }
    }
}
