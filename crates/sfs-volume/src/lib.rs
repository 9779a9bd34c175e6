//! SFS Volume - node-local blob storage
//!
//! A volume store keeps immutable blob payloads as flat files under one
//! directory per volume, addressed by their write position. It services the
//! same operations the blob protocol exposes, so the local node variant and
//! the daemon both sit directly on top of it. Deletes only mark references;
//! byte reclamation is left to the volume garbage collector.

pub mod error;
pub mod store;

pub use error::{VolumeError, VolumeResult};
pub use store::{StoredBlob, VolumeSpec, VolumeStore};
