//! Core type definitions for SFS
//!
//! This module defines the fundamental types used throughout the system:
//! node and volume identities, the cluster roster snapshot, and the segment
//! blob-reference model the rebalance core operates on.

use crate::digest::DigestAlgo;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Unique identifier for a storage node
///
/// Node ids are operator-assigned strings, stable for the lifetime of the
/// node and unique cluster-wide.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node id (validates identifier rules)
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the node id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

/// Unique identifier for a volume
///
/// A volume belongs to exactly one node; its id is unique cluster-wide.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct VolumeId(String);

impl VolumeId {
    /// Create a new volume id (validates identifier rules)
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the volume id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeId({:?})", self.0)
    }
}

fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > 128 {
        return Err(IdError::TooLong);
    }
    for c in id.chars() {
        if c.is_whitespace() || c.is_control() {
            return Err(IdError::InvalidChar(c));
        }
    }
    Ok(())
}

/// Errors that can occur when creating a node or volume id
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier cannot exceed 128 bytes")]
    TooLong,
    #[error("identifier contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Network endpoint of a node
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{host}:{port}")]
pub struct HostPort {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl HostPort {
    /// Create a new host/port pair
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Debug for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostPort({}:{})", self.host, self.port)
    }
}

/// Health state of a volume
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    /// Volume accepts new blobs
    #[default]
    Usable,
    /// Volume has no remaining capacity
    Full,
    /// Volume is failed and must not be used
    Failed,
}

impl VolumeStatus {
    /// Check whether new blobs may be placed on the volume
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Usable)
    }
}

/// A volume as advertised in the cluster roster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDef {
    /// Volume identity
    pub volume_id: VolumeId,
    /// Capacity in bytes
    pub capacity: u64,
    /// Health state
    #[serde(default)]
    pub status: VolumeStatus,
}

/// A node as advertised in the cluster roster
///
/// Roster entries are snapshots taken at call time; the rebalance core never
/// mutates cluster membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDef {
    /// Node identity
    pub node_id: NodeId,
    /// Network endpoint for the blob protocol
    pub address: HostPort,
    /// Whether the node stores blob data
    pub data_node: bool,
    /// Whether the node is the cluster master
    pub master: bool,
    /// Volumes hosted by the node, in advertised order
    pub volumes: Vec<VolumeDef>,
}

impl ServiceDef {
    /// Iterate the node's usable volumes in advertised order
    pub fn usable_volumes(&self) -> impl Iterator<Item = &VolumeDef> {
        self.volumes.iter().filter(|v| v.status.is_usable())
    }
}

/// Role of a blob copy within its segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobRole {
    /// Counted against the segment's primary target
    Primary,
    /// Counted against the segment's replica target
    Replica,
}

/// Reference from a segment to one stored blob copy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobReference {
    /// Volume holding the copy (the volume determines the owning node)
    pub volume_id: VolumeId,
    /// Position of the blob on the volume
    pub position: u64,
    /// Payload length in bytes
    pub length: u64,
    /// Digests recorded at write time, by algorithm
    pub token_digests: BTreeMap<DigestAlgo, Vec<u8>>,
    /// Primary or replica
    pub role: BlobRole,
    /// Number of failed verification sweeps
    pub verify_fail_count: u32,
    /// Set by the bulk reconciler once the copy is persisted and indexed
    pub acked: bool,
    /// Set by balance-down; byte removal happens lazily on the volume
    pub deleted: bool,
}

impl BlobReference {
    /// A reference is eligible iff it is acked, not deleted, and has never
    /// failed verification.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.verify_fail_count == 0 && self.acked && !self.deleted
    }

    /// Digest recorded for the given algorithm, if any
    #[must_use]
    pub fn digest(&self, algo: DigestAlgo) -> Option<&[u8]> {
        self.token_digests.get(&algo).map(Vec::as_slice)
    }
}

/// Logical unit of an object's content with its own replica set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment identity within its object
    pub id: String,
    /// Payload is embedded inline in the index entry; never needs placement
    pub tiny_data: bool,
    /// Container-level replica count override, if set
    pub container_replicas: Option<u32>,
    /// All blob references, primaries and replicas interleaved
    pub blobs: Vec<BlobReference>,
}

impl Segment {
    /// Create an empty segment
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tiny_data: false,
            container_replicas: None,
            blobs: Vec::new(),
        }
    }

    /// Indices of eligible references with the given role, in list order
    #[must_use]
    pub fn eligible_indices(&self, role: BlobRole) -> Vec<usize> {
        self.blobs
            .iter()
            .enumerate()
            .filter(|(_, b)| b.role == role && b.is_eligible())
            .map(|(i, _)| i)
            .collect()
    }

    /// Union of volume ids across all references, eligible or not
    #[must_use]
    pub fn used_volume_ids(&self) -> BTreeSet<VolumeId> {
        self.blobs.iter().map(|b| b.volume_id.clone()).collect()
    }
}
