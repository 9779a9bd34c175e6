//! SFS Stream - streaming primitives for the rebalance core
//!
//! A byte payload moves through the system exactly once: a single source is
//! pumped into one sink, or teed across several, while every participant
//! observes back-pressure. Completions from independent pipelines are joined
//! with [`combine_delay_error`], which never abandons a side early.

pub mod pump;
pub mod sink;

pub use pump::{combine_delay_error, pump, tee};
pub use sink::{BufferSink, ByteSink};

/// Boxed byte source used across crate boundaries
pub type ByteStream =
    futures::stream::BoxStream<'static, sfs_common::Result<bytes::Bytes>>;
