//! SFS Proto - wire types for the `/blob/001` peer protocol
//!
//! Every SFS node exposes the same HTTP surface for blob data; this crate
//! holds the names and JSON shapes both sides must agree on, plus the
//! stream-carrying blob handles exchanged between the protocol layer and
//! the rebalance core.

pub mod blob;
pub mod wire;

pub use blob::{ReadStreamBlob, WriteStreamBlob};
pub use wire::{DigestBlob, DigestEnvelope, HeaderBlob};
