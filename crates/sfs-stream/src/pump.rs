//! Pump, tee, and completion combinators

use crate::sink::ByteSink;
use bytes::Bytes;
use futures::{Future, Stream, StreamExt};
use sfs_common::{Error, Result};

/// Copy a byte source into a sink, honouring back-pressure on both sides
///
/// Terminates the sink when the source ends and returns the number of bytes
/// copied. Either side's error aborts the copy and is propagated; the sink
/// is left unclosed in that case so the caller's drop unwinds it.
pub async fn pump<S, K>(mut source: S, sink: &mut K) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
    K: ByteSink + ?Sized,
{
    let mut copied = 0u64;
    while let Some(chunk) = source.next().await {
        let chunk = chunk?;
        copied += chunk.len() as u64;
        sink.write(chunk).await?;
    }
    sink.close().await?;
    Ok(copied)
}

/// Fan one byte source out to many sinks
///
/// Each source chunk is read once and handed to every sink in order, so the
/// source advances at the rate of the slowest sink and no sink buffers more
/// than one chunk ahead of its peers. Any sink failure cancels the copy; the
/// source and the remaining sinks are abandoned to the caller's drop.
pub async fn tee<S, K>(mut source: S, sinks: &mut [&mut K]) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
    K: ByteSink + ?Sized,
{
    let mut copied = 0u64;
    while let Some(chunk) = source.next().await {
        let chunk = chunk?;
        copied += chunk.len() as u64;
        for sink in sinks.iter_mut() {
            sink.write(chunk.clone()).await?;
        }
    }
    for sink in sinks.iter_mut() {
        sink.close().await?;
    }
    Ok(copied)
}

/// Wait for two independent completions, delaying any failure until both
/// have settled
///
/// Yields `merge(a, b)` when both succeed, otherwise the first captured
/// error; when both sides fail the second error is chained onto the first
/// so neither cause is lost.
pub async fn combine_delay_error<A, B, T, U, R, F>(a: A, b: B, merge: F) -> Result<R>
where
    A: Future<Output = Result<T>>,
    B: Future<Output = Result<U>>,
    F: FnOnce(T, U) -> R,
{
    let (left, right) = futures::join!(a, b);
    match (left, right) {
        (Ok(left), Ok(right)) => Ok(merge(left, right)),
        (Err(first), Ok(_)) | (Ok(_), Err(first)) => Err(first),
        (Err(first), Err(second)) => Err(Error::chain(first, second)),
    }
}
