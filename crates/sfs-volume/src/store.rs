//! File-backed volume store

use crate::error::{VolumeError, VolumeResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sfs_common::digest::DigestCalculator;
use sfs_common::{DigestAlgo, Error, VolumeId, VolumeStatus};
use sfs_proto::{DigestBlob, ReadStreamBlob, WriteStreamBlob};
use sfs_stream::ByteSink;
use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Buffer size for checksum recomputation
const CHECKSUM_BUF: usize = 64 * 1024;

/// Static description of one hosted volume
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume identity
    pub volume_id: VolumeId,
    /// Capacity in bytes
    pub capacity: u64,
}

/// Metadata of one stored blob
#[derive(Clone, Debug)]
pub struct StoredBlob {
    /// Position on the volume
    pub position: u64,
    /// Payload length in bytes
    pub length: u64,
    /// Digests computed while the payload streamed in
    pub digests: BTreeMap<DigestAlgo, Vec<u8>>,
    /// Set once the index has persisted the reference
    pub acked: bool,
    /// Marked for lazy reclamation
    pub deleted: bool,
}

struct VolumeState {
    capacity: u64,
    used: u64,
    status: VolumeStatus,
    next_position: u64,
    blobs: HashMap<u64, StoredBlob>,
}

struct StoreInner {
    root: PathBuf,
    volumes: RwLock<HashMap<VolumeId, VolumeState>>,
}

/// Node-local blob store over a set of volumes
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct VolumeStore {
    inner: Arc<StoreInner>,
}

impl VolumeStore {
    /// Open a store rooted at `root`, creating one directory per volume
    pub fn open(root: impl Into<PathBuf>, specs: &[VolumeSpec]) -> VolumeResult<Self> {
        let root = root.into();
        let mut volumes = HashMap::new();
        for spec in specs {
            std::fs::create_dir_all(root.join(spec.volume_id.as_str()))?;
            volumes.insert(
                spec.volume_id.clone(),
                VolumeState {
                    capacity: spec.capacity,
                    used: 0,
                    status: VolumeStatus::Usable,
                    next_position: 0,
                    blobs: HashMap::new(),
                },
            );
        }
        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                volumes: RwLock::new(volumes),
            }),
        })
    }

    /// Volume ids hosted by this store
    #[must_use]
    pub fn volume_ids(&self) -> Vec<VolumeId> {
        let mut ids: Vec<_> = self.inner.volumes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mark a volume failed; it stops accepting writes
    pub fn set_failed(&self, volume: &VolumeId) -> VolumeResult<()> {
        let mut volumes = self.inner.volumes.write();
        let state = volumes
            .get_mut(volume)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
        state.status = VolumeStatus::Failed;
        Ok(())
    }

    /// Whether the volume currently accepts a new blob
    pub fn can_put(&self, volume: &VolumeId) -> VolumeResult<bool> {
        let volumes = self.inner.volumes.read();
        let state = volumes
            .get(volume)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
        Ok(state.status.is_usable() && state.used < state.capacity)
    }

    /// Stored metadata for a blob, if present
    #[must_use]
    pub fn stored(&self, volume: &VolumeId, position: u64) -> Option<StoredBlob> {
        self.inner
            .volumes
            .read()
            .get(volume)?
            .blobs
            .get(&position)
            .cloned()
    }

    /// Open a write stream for a payload of `declared` bytes
    ///
    /// The position is reserved up front; the receipt resolves once the full
    /// payload has been written and digested. A stream that delivers fewer
    /// or more bytes than declared fails the receipt and leaves no blob
    /// behind.
    pub fn create_write_stream(
        &self,
        volume: &VolumeId,
        declared: u64,
        algos: &[DigestAlgo],
    ) -> VolumeResult<WriteStreamBlob> {
        let position = {
            let mut volumes = self.inner.volumes.write();
            let state = volumes
                .get_mut(volume)
                .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
            if !state.status.is_usable() {
                return Err(VolumeError::VolumeUnusable(volume.clone()));
            }
            let available = state.capacity.saturating_sub(state.used);
            if declared > available {
                return Err(VolumeError::VolumeFull {
                    volume: volume.clone(),
                    required: declared,
                    available,
                });
            }
            let position = state.next_position;
            state.next_position += 1;
            position
        };

        // the token digest must always exist, even for an empty request
        let algos = if algos.is_empty() {
            vec![DigestAlgo::Sha512]
        } else {
            algos.to_vec()
        };

        let inner = self.inner.clone();
        let volume = volume.clone();
        let path = self.blob_path(&volume, position);
        let (tx, mut rx) = futures::channel::mpsc::channel::<Bytes>(1);

        let handle = tokio::spawn(async move {
            let result =
                write_payload(&path, &mut rx, declared, &algos).await;
            match result {
                Ok(digests) => {
                    let blob = StoredBlob {
                        position,
                        length: declared,
                        digests: digests.clone(),
                        acked: false,
                        deleted: false,
                    };
                    {
                        let mut volumes = inner.volumes.write();
                        if let Some(state) = volumes.get_mut(&volume) {
                            state.used += declared;
                            state.blobs.insert(position, blob);
                        }
                    }
                    debug!(%volume, position, length = declared, "blob stored");
                    Ok(DigestBlob {
                        volume,
                        primary: false,
                        replica: false,
                        position,
                        length: declared,
                        digests: digests
                            .into_iter()
                            .map(|(algo, bytes)| (algo, hex::encode(bytes)))
                            .collect(),
                    })
                }
                Err(e) => {
                    warn!(%volume, position, error = %e, "blob write aborted");
                    let _ = tokio::fs::remove_file(&path).await;
                    Err(Error::storage(e.to_string()))
                }
            }
        });

        let receipt = async move {
            handle
                .await
                .map_err(|e| Error::storage(format!("volume write task failed: {e}")))?
        }
        .boxed();

        Ok(WriteStreamBlob::new(Box::new(LocalSink { tx }), receipt))
    }

    /// Open a read stream over a stored blob, or a window of it
    ///
    /// `None` when the blob is absent or marked deleted.
    pub async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> VolumeResult<Option<ReadStreamBlob>> {
        let Some(meta) = self.live_blob(volume, position)? else {
            return Ok(None);
        };
        let (start, window) = clamp_window(meta.length, offset, length)?;

        let mut file = File::open(self.blob_path(volume, position)).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let stream = ReaderStream::new(file.take(window))
            .map(|chunk| chunk.map_err(Error::from))
            .boxed();
        Ok(Some(ReadStreamBlob::new(window, stream)))
    }

    /// Recompute digests over a stored blob, or a window of it
    pub async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> VolumeResult<Option<DigestBlob>> {
        let Some(meta) = self.live_blob(volume, position)? else {
            return Ok(None);
        };
        let (start, window) = clamp_window(meta.length, offset, length)?;
        let algos = if algos.is_empty() {
            vec![DigestAlgo::Sha512]
        } else {
            algos.to_vec()
        };

        let mut file = File::open(self.blob_path(volume, position)).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let mut remaining = window;
        let mut calc = DigestCalculator::new(&algos);
        let mut buf = vec![0u8; CHECKSUM_BUF];
        while remaining > 0 {
            let want = (remaining as usize).min(buf.len());
            let got = file.read(&mut buf[..want]).await?;
            if got == 0 {
                break;
            }
            calc.update(&buf[..got]);
            remaining -= got as u64;
        }

        Ok(Some(DigestBlob {
            volume: volume.clone(),
            primary: false,
            replica: false,
            position,
            length: window,
            digests: calc.finalize_hex(),
        }))
    }

    /// Mark a blob deleted; bytes are reclaimed lazily
    ///
    /// `None` when the blob is absent or already deleted.
    pub fn delete(&self, volume: &VolumeId, position: u64) -> VolumeResult<Option<StoredBlob>> {
        let mut volumes = self.inner.volumes.write();
        let state = volumes
            .get_mut(volume)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
        match state.blobs.get_mut(&position) {
            Some(blob) if !blob.deleted => {
                blob.deleted = true;
                Ok(Some(blob.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Mark a blob acknowledged
    ///
    /// `None` when the blob is absent, deleted, or already acknowledged.
    pub fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> VolumeResult<Option<StoredBlob>> {
        let mut volumes = self.inner.volumes.write();
        let state = volumes
            .get_mut(volume)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
        match state.blobs.get_mut(&position) {
            Some(blob) if !blob.deleted && !blob.acked => {
                blob.acked = true;
                Ok(Some(blob.clone()))
            }
            _ => Ok(None),
        }
    }

    fn live_blob(&self, volume: &VolumeId, position: u64) -> VolumeResult<Option<StoredBlob>> {
        let volumes = self.inner.volumes.read();
        let state = volumes
            .get(volume)
            .ok_or_else(|| VolumeError::VolumeNotFound(volume.clone()))?;
        Ok(state
            .blobs
            .get(&position)
            .filter(|b| !b.deleted)
            .cloned())
    }

    fn blob_path(&self, volume: &VolumeId, position: u64) -> PathBuf {
        self.inner
            .root
            .join(volume.as_str())
            .join(format!("{position}.blob"))
    }
}

fn clamp_window(
    size: u64,
    offset: Option<u64>,
    length: Option<u64>,
) -> VolumeResult<(u64, u64)> {
    let start = offset.unwrap_or(0);
    if start > size {
        return Err(VolumeError::OutOfBounds {
            offset: start,
            length: length.unwrap_or(0),
            size,
        });
    }
    let available = size - start;
    let window = length.map_or(available, |l| l.min(available));
    Ok((start, window))
}

async fn write_payload(
    path: &PathBuf,
    rx: &mut futures::channel::mpsc::Receiver<Bytes>,
    declared: u64,
    algos: &[DigestAlgo],
) -> VolumeResult<BTreeMap<DigestAlgo, Vec<u8>>> {
    let mut file = File::create(path).await?;
    let mut calc = DigestCalculator::new(algos);
    let mut received = 0u64;

    while let Some(chunk) = rx.next().await {
        received += chunk.len() as u64;
        if received > declared {
            return Err(VolumeError::OverlongWrite { declared, received });
        }
        file.write_all(&chunk).await?;
        calc.update(&chunk);
    }
    if received < declared {
        return Err(VolumeError::ShortWrite { declared, received });
    }
    file.flush().await?;
    Ok(calc.finalize())
}

/// Sink half of a local write stream
struct LocalSink {
    tx: futures::channel::mpsc::Sender<Bytes>,
}

#[async_trait]
impl ByteSink for LocalSink {
    async fn write(&mut self, chunk: Bytes) -> sfs_common::Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::storage("local write stream aborted"))
    }

    async fn close(&mut self) -> sfs_common::Result<()> {
        self.tx.close_channel();
        Ok(())
    }
}
