//! Stream-carrying blob handles
//!
//! A read stream wraps a payload that has been located but not yet drained;
//! a write stream pairs the sink a payload is driven into with the
//! single-shot receipt that resolves once the destination has persisted and
//! digested it.

use crate::wire::DigestBlob;
use futures::future::BoxFuture;
use sfs_stream::{ByteSink, ByteStream, pump};

/// An open, undrained byte source for one blob
///
/// The underlying stream is not polled until [`produce`](Self::produce) (or
/// [`into_stream`](Self::into_stream)) attaches a consumer, so headers can
/// be inspected without losing bytes.
pub struct ReadStreamBlob {
    length: u64,
    stream: ByteStream,
}

impl ReadStreamBlob {
    /// Wrap a located payload of known length
    #[must_use]
    pub fn new(length: u64, stream: ByteStream) -> Self {
        Self { length, stream }
    }

    /// Full payload length in bytes
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Pump the payload into a sink, closing the sink at the end
    pub async fn produce<K>(self, sink: &mut K) -> sfs_common::Result<u64>
    where
        K: ByteSink + ?Sized,
    {
        pump(self.stream, sink).await
    }

    /// Surrender the raw byte stream
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

impl std::fmt::Debug for ReadStreamBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStreamBlob")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Receipt future of a write stream
pub type ReceiptFuture = BoxFuture<'static, sfs_common::Result<DigestBlob>>;

/// An open write endpoint on some volume
///
/// Bytes go into the sink; once the sink is closed the receipt resolves
/// with the destination's digest blob, or with the failure that aborted the
/// write. The receipt is single-shot and may be awaited while the sink is
/// still being driven. Dropping the sink unclosed aborts the write.
pub struct WriteStreamBlob {
    sink: Box<dyn ByteSink>,
    receipt: ReceiptFuture,
}

impl WriteStreamBlob {
    /// Pair a sink with its receipt
    #[must_use]
    pub fn new(sink: Box<dyn ByteSink>, receipt: ReceiptFuture) -> Self {
        Self { sink, receipt }
    }

    /// Split into the drivable sink and the awaited receipt
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn ByteSink>, ReceiptFuture) {
        (self.sink, self.receipt)
    }

    /// Drive the sink from an in-memory payload and await the receipt
    ///
    /// Convenience for callers that do not tee; the rebalance planner uses
    /// [`into_parts`](Self::into_parts) instead.
    pub async fn put(self, payload: bytes::Bytes) -> sfs_common::Result<DigestBlob> {
        let (mut sink, receipt) = self.into_parts();
        let write = async move {
            sink.write(payload).await?;
            sink.close().await?;
            Ok(())
        };
        sfs_stream::combine_delay_error(write, receipt, |(), receipt| receipt).await
    }
}

impl std::fmt::Debug for WriteStreamBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStreamBlob").finish_non_exhaustive()
    }
}
