//! In-memory cluster fixtures for rebalance tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::RwLock;
use sfs_common::digest::DigestCalculator;
use sfs_common::{
    BlobReference, BlobRole, DigestAlgo, Error, HostPort, NodeId, Result, ServiceDef,
    VolumeDef, VolumeId, VolumeStatus,
};
use sfs_node::{NodeDirectory, XNode};
use sfs_proto::{DigestBlob, HeaderBlob, ReadStreamBlob, WriteStreamBlob};
use sfs_rebalance::{Index, ReplicationPolicy};
use sfs_stream::ByteSink;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn nid(id: &str) -> NodeId {
    NodeId::new_unchecked(id)
}

pub fn vid(id: &str) -> VolumeId {
    VolumeId::new_unchecked(id)
}

pub fn sha512_hex(payload: &[u8]) -> String {
    hex::encode(sfs_common::digest::digest(DigestAlgo::Sha512, payload))
}

/// Failure-injection knobs for a [`MemNode`]
#[derive(Default)]
pub struct Behavior {
    /// Write receipts report a bogus sha512
    pub corrupt_write_digest: bool,
    /// Read streams yield this many bytes, then a transport error
    pub fail_read_after: Option<usize>,
    /// Capacity probes fail with a protocol error
    pub fail_can_put: bool,
}

#[derive(Clone)]
pub struct MemBlob {
    pub payload: Bytes,
    pub acked: bool,
    pub deleted: bool,
}

struct MemVolume {
    accept: bool,
    next_position: u64,
    blobs: HashMap<u64, MemBlob>,
}

struct MemNodeInner {
    node_id: NodeId,
    address: HostPort,
    behavior: Behavior,
    volumes: RwLock<HashMap<VolumeId, MemVolume>>,
}

/// Fully in-memory node for exercising the core without disks or sockets
#[derive(Clone)]
pub struct MemNode(Arc<MemNodeInner>);

impl MemNode {
    pub fn new(id: &str, port: u16, volumes: &[&str]) -> Self {
        Self::with_behavior(id, port, volumes, Behavior::default())
    }

    pub fn with_behavior(id: &str, port: u16, volumes: &[&str], behavior: Behavior) -> Self {
        let volumes = volumes
            .iter()
            .map(|v| {
                (
                    vid(v),
                    MemVolume {
                        accept: true,
                        next_position: 0,
                        blobs: HashMap::new(),
                    },
                )
            })
            .collect();
        Self(Arc::new(MemNodeInner {
            node_id: nid(id),
            address: HostPort::new("127.0.0.1", port),
            behavior,
            volumes: RwLock::new(volumes),
        }))
    }

    /// Make a volume decline capacity probes
    pub fn set_accept(&self, volume: &str, accept: bool) {
        if let Some(vol) = self.0.volumes.write().get_mut(&vid(volume)) {
            vol.accept = accept;
        }
    }

    pub fn blob(&self, volume: &str, position: u64) -> Option<MemBlob> {
        self.0
            .volumes
            .read()
            .get(&vid(volume))?
            .blobs
            .get(&position)
            .cloned()
    }

    pub fn blob_count(&self, volume: &str) -> usize {
        self.0
            .volumes
            .read()
            .get(&vid(volume))
            .map_or(0, |v| v.blobs.len())
    }

    /// Store a payload directly and return a reference to it
    pub fn seed(
        &self,
        volume: &str,
        payload: &[u8],
        role: BlobRole,
        acked: bool,
    ) -> BlobReference {
        let payload = Bytes::copy_from_slice(payload);
        let digest = sfs_common::digest::digest(DigestAlgo::Sha512, &payload);
        let mut volumes = self.0.volumes.write();
        let vol = volumes.get_mut(&vid(volume)).expect("seeded volume exists");
        let position = vol.next_position;
        vol.next_position += 1;
        vol.blobs.insert(
            position,
            MemBlob {
                payload: payload.clone(),
                acked,
                deleted: false,
            },
        );
        BlobReference {
            volume_id: vid(volume),
            position,
            length: payload.len() as u64,
            token_digests: BTreeMap::from([(DigestAlgo::Sha512, digest)]),
            role,
            verify_fail_count: 0,
            acked,
            deleted: false,
        }
    }
}

#[async_trait]
impl XNode for MemNode {
    fn node_id(&self) -> &NodeId {
        &self.0.node_id
    }

    fn host_and_port(&self) -> &HostPort {
        &self.0.address
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> Result<Option<DigestBlob>> {
        let Some(blob) = self.live_blob(volume, position) else {
            return Ok(None);
        };
        let start = offset.unwrap_or(0) as usize;
        let end = length.map_or(blob.payload.len(), |l| {
            (start + l as usize).min(blob.payload.len())
        });
        let mut calc = DigestCalculator::new(algos);
        calc.update(&blob.payload[start..end]);
        Ok(Some(DigestBlob {
            volume: volume.clone(),
            primary: false,
            replica: false,
            position,
            length: (end - start) as u64,
            digests: calc.finalize_hex(),
        }))
    }

    async fn delete(&self, volume: &VolumeId, position: u64) -> Result<Option<HeaderBlob>> {
        let mut volumes = self.0.volumes.write();
        let Some(vol) = volumes.get_mut(volume) else {
            return Ok(None);
        };
        match vol.blobs.get_mut(&position) {
            Some(blob) if !blob.deleted => {
                blob.deleted = true;
                Ok(Some(HeaderBlob::default()))
            }
            _ => Ok(None),
        }
    }

    async fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>> {
        let mut volumes = self.0.volumes.write();
        let Some(vol) = volumes.get_mut(volume) else {
            return Ok(None);
        };
        match vol.blobs.get_mut(&position) {
            Some(blob) if !blob.deleted && !blob.acked => {
                blob.acked = true;
                Ok(Some(HeaderBlob::default()))
            }
            _ => Ok(None),
        }
    }

    async fn can_put(&self, volume: &VolumeId) -> Result<bool> {
        if self.0.behavior.fail_can_put {
            return Err(Error::ProtocolStatus {
                status: 503,
                url: format!("http://{}/blob/001/canput", self.0.address),
                body: "probe refused".into(),
            });
        }
        Ok(self
            .0
            .volumes
            .read()
            .get(volume)
            .is_some_and(|v| v.accept))
    }

    async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        _offset: Option<u64>,
        _length: Option<u64>,
    ) -> Result<Option<ReadStreamBlob>> {
        let Some(blob) = self.live_blob(volume, position) else {
            return Ok(None);
        };
        let length = blob.payload.len() as u64;

        let stream = match self.0.behavior.fail_read_after {
            Some(cut) => {
                let cut = cut.min(blob.payload.len());
                let head = blob.payload.slice(..cut);
                futures::stream::iter(vec![
                    Ok(head),
                    Err(Error::transport(
                        format!("http://{}/blob/001", self.0.address),
                        1,
                        "connection reset mid-stream",
                    )),
                ])
                .boxed()
            }
            None => {
                let chunks: Vec<_> = blob
                    .payload
                    .chunks(1024)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                futures::stream::iter(chunks).boxed()
            }
        };
        Ok(Some(ReadStreamBlob::new(length, stream)))
    }

    async fn create_write_stream(
        &self,
        volume: &VolumeId,
        _length: u64,
        algos: &[DigestAlgo],
    ) -> Result<WriteStreamBlob> {
        let position = {
            let mut volumes = self.0.volumes.write();
            let vol = volumes
                .get_mut(volume)
                .ok_or_else(|| Error::storage(format!("unknown volume {volume}")))?;
            let position = vol.next_position;
            vol.next_position += 1;
            position
        };

        let (tx, mut rx) = futures::channel::mpsc::channel::<Bytes>(1);
        let inner = self.0.clone();
        let volume = volume.clone();
        let algos = algos.to_vec();

        let receipt = async move {
            let mut calc = DigestCalculator::new(&algos);
            let mut buf = BytesMut::new();
            while let Some(chunk) = rx.next().await {
                calc.update(&chunk);
                buf.extend_from_slice(&chunk);
            }
            let payload = buf.freeze();
            let mut digests = calc.finalize_hex();
            if inner.behavior.corrupt_write_digest {
                digests.insert(DigestAlgo::Sha512, "00".repeat(64));
            }
            let length = payload.len() as u64;
            if let Some(vol) = inner.volumes.write().get_mut(&volume) {
                vol.blobs.insert(
                    position,
                    MemBlob {
                        payload,
                        acked: false,
                        deleted: false,
                    },
                );
            }
            Ok(DigestBlob {
                volume,
                primary: false,
                replica: false,
                position,
                length,
                digests,
            })
        }
        .boxed();

        Ok(WriteStreamBlob::new(Box::new(MemSink { tx }), receipt))
    }
}

impl MemNode {
    fn live_blob(&self, volume: &VolumeId, position: u64) -> Option<MemBlob> {
        self.0
            .volumes
            .read()
            .get(volume)?
            .blobs
            .get(&position)
            .filter(|b| !b.deleted)
            .cloned()
    }
}

struct MemSink {
    tx: futures::channel::mpsc::Sender<Bytes>,
}

#[async_trait]
impl ByteSink for MemSink {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::storage("mem write stream aborted"))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx.close_channel();
        Ok(())
    }
}

/// Directory over a fixed set of in-memory nodes
#[derive(Default)]
pub struct TestDirectory {
    nodes: RwLock<HashMap<NodeId, Arc<dyn XNode>>>,
    owners: RwLock<HashMap<VolumeId, NodeId>>,
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: &MemNode) {
        let id = node.node_id().clone();
        for volume in node.0.volumes.read().keys() {
            self.owners.write().insert(volume.clone(), id.clone());
        }
        self.nodes.write().insert(id, Arc::new(node.clone()));
    }
}

impl NodeDirectory for TestDirectory {
    fn lookup(&self, node_id: &NodeId) -> Result<Arc<dyn XNode>> {
        self.nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    fn owner_of(&self, volume: &VolumeId) -> Option<Arc<dyn XNode>> {
        let node_id = self.owners.read().get(volume).cloned()?;
        self.lookup(&node_id).ok()
    }

    fn update_roster(&self, roster: &[ServiceDef]) {
        let mut owners = self.owners.write();
        for def in roster {
            for volume in &def.volumes {
                owners.insert(volume.volume_id.clone(), def.node_id.clone());
            }
        }
    }
}

/// Fixed replication expectations
pub struct StaticPolicy {
    pub primaries: u32,
    pub replicas: u32,
    pub allow_same_node: bool,
    pub master: bool,
}

impl StaticPolicy {
    pub fn primaries(primaries: u32) -> Self {
        Self {
            primaries,
            replicas: 0,
            allow_same_node: false,
            master: true,
        }
    }
}

impl ReplicationPolicy for StaticPolicy {
    fn number_of_primaries(&self) -> u32 {
        self.primaries
    }

    fn number_of_replicas(&self) -> u32 {
        self.replicas
    }

    fn allow_same_node(&self) -> bool {
        self.allow_same_node
    }

    fn is_master(&self) -> bool {
        self.master
    }
}

/// Index stub: serves a fixed roster and forwards deletes to the owner node
pub struct MockIndex {
    pub roster: Vec<ServiceDef>,
    pub directory: Arc<TestDirectory>,
    pub delete_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl MockIndex {
    pub fn new(roster: Vec<ServiceDef>, directory: Arc<TestDirectory>) -> Self {
        Self {
            roster,
            directory,
            delete_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Index for MockIndex {
    async fn list_data_nodes(&self) -> Result<Vec<ServiceDef>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.roster.clone())
    }

    async fn delete_blob_reference(&self, blob: &BlobReference) -> Result<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        match self.directory.owner_of(&blob.volume_id) {
            Some(node) => Ok(node
                .delete(&blob.volume_id, blob.position)
                .await?
                .is_some()),
            None => Ok(false),
        }
    }
}

/// Roster entry for a node and its volumes
pub fn service_def(node: &MemNode) -> ServiceDef {
    let mut volumes: Vec<VolumeDef> = node
        .0
        .volumes
        .read()
        .keys()
        .map(|v| VolumeDef {
            volume_id: v.clone(),
            capacity: 1 << 30,
            status: VolumeStatus::Usable,
        })
        .collect();
    volumes.sort_by(|a, b| a.volume_id.cmp(&b.volume_id));
    ServiceDef {
        node_id: node.node_id().clone(),
        address: node.host_and_port().clone(),
        data_node: true,
        master: false,
        volumes,
    }
}
