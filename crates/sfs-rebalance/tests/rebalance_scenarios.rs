//! End-to-end rebalance scenarios over an in-memory cluster

mod support;

use sfs_common::{BlobRole, DigestAlgo, Segment};
use sfs_rebalance::RebalanceController;
use std::collections::BTreeSet;
use std::sync::Arc;
use support::{Behavior, MemNode, MockIndex, StaticPolicy, TestDirectory, service_def};

const PAYLOAD: &[u8] = b"segment payload: forty-two bytes of content!!";

struct Cluster {
    directory: Arc<TestDirectory>,
    index: Arc<MockIndex>,
}

impl Cluster {
    fn new(nodes: &[&MemNode]) -> Self {
        let directory = Arc::new(TestDirectory::new());
        for node in nodes {
            directory.register(node);
        }
        let roster = nodes.iter().map(|n| service_def(n)).collect();
        let index = Arc::new(MockIndex::new(roster, directory.clone()));
        Self { directory, index }
    }

    fn controller(&self, policy: StaticPolicy) -> RebalanceController {
        RebalanceController::new(
            Arc::new(policy),
            self.index.clone(),
            self.directory.clone(),
        )
    }
}

/// Scenario: one eligible primary, three expected
#[tokio::test]
async fn test_balance_up_one_to_three_primaries() {
    let a = MemNode::new("node-a", 9211, &["v1"]);
    let b = MemNode::new("node-b", 9212, &["v2"]);
    let c = MemNode::new("node-c", 9213, &["v3"]);
    let d = MemNode::new("node-d", 9214, &["v4"]);
    let cluster = Cluster::new(&[&a, &b, &c, &d]);

    let mut segment = Segment::new("seg-up");
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));

    let controller = cluster.controller(StaticPolicy::primaries(3));
    assert!(controller.rebalance(&mut segment).await);

    let primaries: Vec<_> = segment
        .blobs
        .iter()
        .filter(|r| r.role == BlobRole::Primary && !r.deleted)
        .collect();
    assert_eq!(primaries.len(), 3);

    // the two fresh copies are un-acked; the original stays acked
    assert_eq!(segment.blobs.iter().filter(|r| !r.acked).count(), 2);

    // every copy carries the same sha512 as the source
    let expected = segment.blobs[0].digest(DigestAlgo::Sha512).unwrap().to_vec();
    for reference in &segment.blobs {
        assert_eq!(reference.digest(DigestAlgo::Sha512).unwrap(), &expected);
        assert_eq!(reference.verify_fail_count, 0);
    }

    // no volume holds two copies
    let volumes: BTreeSet<_> = segment.blobs.iter().map(|r| r.volume_id.clone()).collect();
    assert_eq!(volumes.len(), 3);

    // candidates were probed in roster order, so the fourth node stayed idle
    assert_eq!(b.blob_count("v2"), 1);
    assert_eq!(c.blob_count("v3"), 1);
    assert_eq!(d.blob_count("v4"), 0);
}

/// Scenario: five eligible primaries, two expected
#[tokio::test]
async fn test_balance_down_five_to_two_primaries() {
    let e = MemNode::new("node-e", 9221, &["w1", "w2", "w3", "w4", "w5"]);
    let cluster = Cluster::new(&[&e]);

    let mut segment = Segment::new("seg-down");
    for volume in ["w1", "w2", "w3", "w4", "w5"] {
        segment
            .blobs
            .push(e.seed(volume, PAYLOAD, BlobRole::Primary, true));
    }

    let controller = cluster.controller(StaticPolicy::primaries(2));
    assert!(controller.rebalance(&mut segment).await);

    // exactly three deletions, earliest references first
    assert_eq!(cluster.index.delete_calls(), 3);
    for (i, reference) in segment.blobs.iter().enumerate() {
        assert_eq!(reference.deleted, i < 3, "reference {i}");
    }
    assert_eq!(segment.eligible_indices(BlobRole::Primary).len(), 2);

    // pure balance-down never consults the roster
    assert_eq!(cluster.index.list_calls(), 0);

    // the copies are gone on the node as well
    assert!(e.blob("w1", 0).unwrap().deleted);
    assert!(!e.blob("w4", 0).unwrap().deleted);
}

/// Scenario: not enough free volumes for balance-up; the concurrent
/// balance-down still runs
#[tokio::test]
async fn test_insufficient_capacity_does_not_block_balance_down() {
    let a = MemNode::new("node-a", 9231, &["v1", "v2"]);
    let b = MemNode::new("node-b", 9232, &["v3"]);
    let c = MemNode::new("node-c", 9233, &["v4"]);
    let cluster = Cluster::new(&[&a, &b, &c]);

    let mut segment = Segment::new("seg-tight");
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));
    // a surplus replica: the policy expects none
    segment
        .blobs
        .push(a.seed("v2", PAYLOAD, BlobRole::Replica, true));

    // three more primaries wanted, but only v3 and v4 are free
    let controller = cluster.controller(StaticPolicy::primaries(4));
    assert!(controller.rebalance(&mut segment).await);

    // balance-up failed as a whole: nothing appended, targets untouched
    assert_eq!(segment.blobs.len(), 2);
    assert_eq!(b.blob_count("v3"), 0);
    assert_eq!(c.blob_count("v4"), 0);

    // the surplus replica was still deleted
    assert!(segment.blobs[1].deleted);
    assert_eq!(cluster.index.delete_calls(), 1);
}

/// Scenario: one write target reports a wrong digest
#[tokio::test]
async fn test_digest_mismatch_appends_nothing() {
    let a = MemNode::new("node-a", 9241, &["v1"]);
    let b = MemNode::new("node-b", 9242, &["v2"]);
    let c = MemNode::with_behavior(
        "node-c",
        9243,
        &["v3"],
        Behavior {
            corrupt_write_digest: true,
            ..Behavior::default()
        },
    );
    let cluster = Cluster::new(&[&a, &b, &c]);

    let mut segment = Segment::new("seg-mismatch");
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));
    let before = segment.blobs.clone();

    let controller = cluster.controller(StaticPolicy::primaries(3));
    assert!(!controller.rebalance(&mut segment).await);

    // no partial success: the existing reference list is untouched
    assert_eq!(segment.blobs, before);
}

/// Scenario: the source read fails mid-stream
#[tokio::test]
async fn test_source_failure_aborts_balance_up() {
    let a = MemNode::with_behavior(
        "node-a",
        9251,
        &["v1"],
        Behavior {
            fail_read_after: Some(4),
            ..Behavior::default()
        },
    );
    let b = MemNode::new("node-b", 9252, &["v2"]);
    let c = MemNode::new("node-c", 9253, &["v3"]);
    let cluster = Cluster::new(&[&a, &b, &c]);

    let mut segment = Segment::new("seg-cut");
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));
    let before = segment.blobs.clone();

    let controller = cluster.controller(StaticPolicy::primaries(3));
    assert!(!controller.rebalance(&mut segment).await);
    assert_eq!(segment.blobs, before);
}

/// Scenario: tiny-data segments are stable by definition
#[tokio::test]
async fn test_tiny_data_short_circuits() {
    let cluster = Cluster::new(&[]);
    let mut segment = Segment::new("seg-tiny");
    segment.tiny_data = true;

    let controller = cluster.controller(StaticPolicy::primaries(3));
    assert!(controller.rebalance(&mut segment).await);

    assert!(segment.blobs.is_empty());
    assert_eq!(cluster.index.list_calls(), 0);
    assert_eq!(cluster.index.delete_calls(), 0);
}

/// The container-level replica override takes precedence over the cluster
/// default
#[tokio::test]
async fn test_container_replica_override() {
    let a = MemNode::new("node-a", 9261, &["v1"]);
    let b = MemNode::new("node-b", 9262, &["v2"]);
    let cluster = Cluster::new(&[&a, &b]);

    let mut segment = Segment::new("seg-override");
    segment.container_replicas = Some(1);
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));

    // cluster default is zero replicas; the container wants one
    let controller = cluster.controller(StaticPolicy::primaries(1));
    assert!(controller.rebalance(&mut segment).await);

    let replicas: Vec<_> = segment
        .blobs
        .iter()
        .filter(|r| r.role == BlobRole::Replica)
        .collect();
    assert_eq!(replicas.len(), 1);
    assert!(!replicas[0].acked);
    assert_eq!(replicas[0].volume_id.as_str(), "v2");
}

/// A segment with no reachable copy defers balance-up to the next sweep
#[tokio::test]
async fn test_unreadable_segment_defers() {
    let a = MemNode::new("node-a", 9271, &["v1"]);
    let b = MemNode::new("node-b", 9272, &["v2"]);
    let cluster = Cluster::new(&[&a, &b]);

    let mut segment = Segment::new("seg-lost");
    let mut reference = a.seed("v1", PAYLOAD, BlobRole::Primary, true);
    // point the reference at a position that holds nothing
    reference.position += 10;
    segment.blobs.push(reference);

    let controller = cluster.controller(StaticPolicy::primaries(2));
    assert!(!controller.rebalance(&mut segment).await);
    assert_eq!(segment.blobs.len(), 1);
}

/// Only the master runs the sweep
#[tokio::test]
async fn test_sweep_requires_master() {
    let a = MemNode::new("node-a", 9281, &["v1"]);
    let cluster = Cluster::new(&[&a]);

    let mut segments = vec![Segment::new("seg-a")];
    segments[0]
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));

    let mut policy = StaticPolicy::primaries(3);
    policy.master = false;
    let controller = cluster.controller(policy);

    assert_eq!(controller.rebalance_segments(&mut segments).await, 0);
    assert_eq!(segments[0].blobs.len(), 1);
    assert_eq!(cluster.index.list_calls(), 0);
}

/// Convergence: with the reconciler acking fresh copies between passes, the
/// segment reaches its expected counts and then stays put
#[tokio::test]
async fn test_converges_once_reconciler_acks() {
    let a = MemNode::new("node-a", 9291, &["v1"]);
    let b = MemNode::new("node-b", 9292, &["v2"]);
    let c = MemNode::new("node-c", 9293, &["v3"]);
    let cluster = Cluster::new(&[&a, &b, &c]);

    let mut segment = Segment::new("seg-converge");
    segment
        .blobs
        .push(a.seed("v1", PAYLOAD, BlobRole::Primary, true));

    let controller = cluster.controller(StaticPolicy::primaries(3));

    assert!(controller.rebalance(&mut segment).await);
    // stand in for the bulk reconciler
    for reference in &mut segment.blobs {
        reference.acked = true;
    }
    assert_eq!(segment.eligible_indices(BlobRole::Primary).len(), 3);

    // the segment is balanced now; another pass changes nothing
    assert!(!controller.rebalance(&mut segment).await);
    assert_eq!(segment.blobs.len(), 3);
}
