//! Byte sink abstraction
//!
//! Write destinations (remote write streams, volume files, in-memory
//! buffers) expose the same two-method surface so the pump and tee do not
//! care where bytes land.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use sfs_common::Result;

/// A back-pressured destination for a byte stream
///
/// `write` must not return until the sink has accepted the chunk; that is
/// the only back-pressure signal the pump relies on. `close` terminates the
/// sink after the final chunk. Dropping a sink without closing it aborts
/// whatever it was feeding.
#[async_trait]
pub trait ByteSink: Send {
    /// Accept one chunk
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Terminate the sink after the last chunk
    async fn close(&mut self) -> Result<()>;
}

/// Sink accumulating everything into memory
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: BytesMut,
    closed: bool,
}

impl BufferSink {
    /// Create an empty buffer sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `close` has been observed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume the sink and return the collected bytes
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Collected bytes so far
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[async_trait]
impl ByteSink for BufferSink {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
