//! Volume storage error types

use sfs_common::VolumeId;
use thiserror::Error;

/// Result type for volume store operations
pub type VolumeResult<T> = std::result::Result<T, VolumeError>;

/// Volume storage error
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Volume not hosted by this store
    #[error("volume not found: {0}")]
    VolumeNotFound(VolumeId),

    /// Volume exists but is not usable
    #[error("volume {0} is not usable")]
    VolumeUnusable(VolumeId),

    /// Not enough remaining capacity for the declared payload
    #[error("volume {volume} full: required {required} bytes, available {available}")]
    VolumeFull {
        volume: VolumeId,
        required: u64,
        available: u64,
    },

    /// Requested window exceeds the stored payload
    #[error("offset {offset} + length {length} exceeds blob size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    /// Write stream ended before the declared length arrived
    #[error("short write: declared {declared} bytes, received {received}")]
    ShortWrite { declared: u64, received: u64 },

    /// Write stream delivered more than the declared length
    #[error("overlong write: declared {declared} bytes, received at least {received}")]
    OverlongWrite { declared: u64, received: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
