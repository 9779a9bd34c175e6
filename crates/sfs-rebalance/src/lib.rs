//! SFS Rebalance - the replica placement and rebalancing core
//!
//! Per segment, the controller compares verified copy counts against the
//! cluster's expectations and drives three concurrent corrections: surplus
//! primaries and surplus replicas are deleted, missing copies are written
//! fresh by teeing one healthy source across a planned group of target
//! volumes. New copies are deliberately left un-acknowledged: the index-side
//! bulk updater persists and acks them, so a failed index write leaves
//! reclaimable bytes instead of orphaned records.
//!
//! The index, the replication policy, and node resolution are consumed
//! through the traits in [`cluster`] and `sfs-node`; everything here is
//! polymorphic over [`XNode`](sfs_node::XNode).

pub mod cluster;
pub mod controller;
pub mod planner;
pub mod reader;

pub use cluster::{ConfiguredReplication, Index, ReplicationPolicy};
pub use controller::RebalanceController;
pub use planner::{CandidateNode, PlacedCopy, ReplicaGroupPlanner};
pub use reader::SegmentReader;
