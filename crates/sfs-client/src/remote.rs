//! Remote blob protocol client implementation

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use reqwest::StatusCode;
use reqwest::header::CONTENT_LENGTH;
use sfs_common::{DigestAlgo, Error, HostPort, NodeId, Result, VolumeId};
use sfs_proto::wire::{
    ACK_PATH, BLOB_PATH, CANPUT_PATH, CHECKSUM_PATH, TOKEN_HEADER, query,
};
use sfs_proto::{DigestBlob, DigestEnvelope, HeaderBlob, ReadStreamBlob, WriteStreamBlob};
use sfs_stream::ByteSink;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest response-body prefix preserved in protocol errors
const ERROR_BODY_LIMIT: usize = 4096;

/// Typed client for one peer node's blob protocol
///
/// Instances share the process-wide `reqwest::Client` (and thus its
/// connection pool); per-peer state is only the endpoint, the node id sent
/// as the `node` query parameter, and the precomputed token header value.
#[derive(Clone)]
pub struct RemoteBlobClient {
    http: reqwest::Client,
    node_id: NodeId,
    base: String,
    token: String,
    response_timeout: Duration,
}

impl RemoteBlobClient {
    /// Create a client for the peer at `address`
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        node_id: NodeId,
        address: &HostPort,
        secret: &[u8],
        response_timeout: Duration,
    ) -> Self {
        Self {
            http,
            node_id,
            base: format!("http://{address}"),
            token: BASE64.encode(secret),
            response_timeout,
        }
    }

    /// Identity of the peer this client talks to
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Keep-alive timeout advertised to the peer: half the response timeout
    fn keep_alive_secs(&self) -> u64 {
        (self.response_timeout.as_secs() / 2).max(1)
    }

    fn base_params(&self, volume: &VolumeId) -> Vec<(String, String)> {
        vec![
            (query::NODE.into(), self.node_id.to_string()),
            (query::VOLUME.into(), volume.to_string()),
        ]
    }

    /// Compute a digest of a stored blob, or of a window of it
    ///
    /// `code` 200 in the envelope yields the digest blob, 404 means the blob
    /// is absent; anything else, or a non-200 HTTP status, is a protocol
    /// error.
    pub async fn checksum(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algos: &[DigestAlgo],
    ) -> Result<Option<DigestBlob>> {
        let url = self.url(CHECKSUM_PATH);
        let mut params = self.base_params(volume);
        params.push((query::POSITION.into(), position.to_string()));
        params.push((
            query::KEEP_ALIVE_TIMEOUT.into(),
            self.keep_alive_secs().to_string(),
        ));
        if let Some(offset) = offset {
            params.push((query::OFFSET.into(), offset.to_string()));
        }
        if let Some(length) = length {
            params.push((query::LENGTH.into(), length.to_string()));
        }
        for algo in algos {
            params.push((query::computed_digest(*algo), "true".into()));
        }

        let started = Instant::now();
        let response = self
            .http
            .get(&url)
            .query(&params)
            .header(TOKEN_HEADER, &self.token)
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|e| transport_err(&url, started, &e))?;

        let url = response.url().to_string();
        if response.status() != StatusCode::OK {
            return Err(status_err(response).await);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_err(&url, started, &e))?;
        DigestEnvelope::parse(&url, &body)?.into_optional_blob(&url)
    }

    /// Delete a blob; `None` when it was already absent or not modifiable
    pub async fn delete(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>> {
        let url = self.url(BLOB_PATH);
        let mut params = self.base_params(volume);
        params.push((query::POSITION.into(), position.to_string()));
        self.header_op(self.http.delete(&url), &url, params).await
    }

    /// Acknowledge a persisted blob; status mapping identical to `delete`
    pub async fn acknowledge(
        &self,
        volume: &VolumeId,
        position: u64,
    ) -> Result<Option<HeaderBlob>> {
        let url = self.url(ACK_PATH);
        let mut params = self.base_params(volume);
        params.push((query::POSITION.into(), position.to_string()));
        self.header_op(self.http.put(&url), &url, params).await
    }

    async fn header_op(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
        params: Vec<(String, String)>,
    ) -> Result<Option<HeaderBlob>> {
        let started = Instant::now();
        let response = builder
            .query(&params)
            .header(TOKEN_HEADER, &self.token)
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|e| transport_err(url, started, &e))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Some(header_blob(&response))),
            StatusCode::NOT_MODIFIED => Ok(None),
            _ => Err(status_err(response).await),
        }
    }

    /// Probe whether the peer accepts a new blob on the volume
    ///
    /// Any status below 400 is acceptance; 400 and above surfaces as a
    /// protocol error, which planners treat as a skippable probe failure.
    pub async fn can_put(&self, volume: &VolumeId) -> Result<bool> {
        let url = self.url(CANPUT_PATH);
        let params = self.base_params(volume);

        let started = Instant::now();
        let response = self
            .http
            .put(&url)
            .query(&params)
            .header(TOKEN_HEADER, &self.token)
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|e| transport_err(&url, started, &e))?;

        if response.status().as_u16() < 400 {
            Ok(true)
        } else {
            Err(status_err(response).await)
        }
    }

    /// Open a read stream for a stored blob, or a window of it
    ///
    /// The response body is not drained until the returned blob is produced
    /// into a sink.
    pub async fn create_read_stream(
        &self,
        volume: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<ReadStreamBlob>> {
        let url = self.url(BLOB_PATH);
        let mut params = self.base_params(volume);
        params.push((query::POSITION.into(), position.to_string()));
        if let Some(offset) = offset {
            params.push((query::OFFSET.into(), offset.to_string()));
        }
        if let Some(length) = length {
            params.push((query::LENGTH.into(), length.to_string()));
        }

        let started = Instant::now();
        let response = self
            .http
            .get(&url)
            .query(&params)
            .header(TOKEN_HEADER, &self.token)
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|e| transport_err(&url, started, &e))?;

        let url = response.url().to_string();
        match response.status() {
            StatusCode::OK => {
                let length = response.content_length().ok_or_else(|| {
                    Error::protocol_body(&url, "read stream without content-length")
                })?;
                let stream_url = url.clone();
                let stream = response
                    .bytes_stream()
                    .map(move |chunk| {
                        chunk.map_err(|e| transport_err(&stream_url, started, &e))
                    })
                    .boxed();
                Ok(Some(ReadStreamBlob::new(length, stream)))
            }
            StatusCode::NOT_FOUND => {
                // drain so the connection returns to the pool
                let _ = response.bytes().await;
                Ok(None)
            }
            _ => Err(status_err(response).await),
        }
    }

    /// Open a write stream of `length` bytes on the volume
    ///
    /// The PUT is dispatched immediately with a channel-backed body; chunks
    /// written to the returned sink stream into the request, and closing the
    /// sink lets the peer respond with the receipt envelope. The receipt may
    /// be awaited concurrently with driving the sink.
    pub async fn create_write_stream(
        &self,
        volume: &VolumeId,
        length: u64,
        algos: &[DigestAlgo],
    ) -> Result<WriteStreamBlob> {
        let url = self.url(BLOB_PATH);
        let mut params = self.base_params(volume);
        params.push((
            query::KEEP_ALIVE_TIMEOUT.into(),
            self.keep_alive_secs().to_string(),
        ));
        for algo in algos {
            params.push((query::computed_digest(*algo), "true".into()));
        }

        let (tx, rx) = futures::channel::mpsc::channel::<Bytes>(1);
        let body = reqwest::Body::wrap_stream(rx.map(Ok::<_, std::convert::Infallible>));

        let request = self
            .http
            .put(&url)
            .query(&params)
            .header(TOKEN_HEADER, &self.token)
            .header(CONTENT_LENGTH, length)
            .timeout(self.response_timeout)
            .body(body);

        let receipt_url = url.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let response = request
                .send()
                .await
                .map_err(|e| transport_err(&receipt_url, started, &e))?;

            let url = response.url().to_string();
            if response.status() != StatusCode::OK {
                return Err(status_err(response).await);
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| transport_err(&url, started, &e))?;
            let envelope = DigestEnvelope::parse(&url, &bytes)?;
            if envelope.code != 200 {
                return Err(Error::protocol_body(
                    &url,
                    format!("write receipt code {}", envelope.code),
                ));
            }
            envelope
                .blob
                .ok_or_else(|| Error::protocol_body(&url, "write receipt without blob"))
        });

        let receipt = async move {
            handle
                .await
                .map_err(|e| Error::storage(format!("write request task failed: {e}")))?
        }
        .boxed();

        debug!(volume = %volume, length, "opened remote write stream");
        Ok(WriteStreamBlob::new(
            Box::new(ChannelSink {
                tx,
                url,
                started: Instant::now(),
            }),
            receipt,
        ))
    }
}

/// Sink half of a remote write stream: chunks go into the request body
struct ChannelSink {
    tx: futures::channel::mpsc::Sender<Bytes>,
    url: String,
    started: Instant,
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.tx.send(chunk).await.map_err(|_| {
            Error::transport(
                &self.url,
                self.started.elapsed().as_millis() as u64,
                "write stream closed by peer",
            )
        })
    }

    async fn close(&mut self) -> Result<()> {
        // disconnecting the channel ends the request body
        self.tx.close_channel();
        Ok(())
    }
}

fn transport_err(url: &str, started: Instant, error: &reqwest::Error) -> Error {
    Error::transport(
        url,
        started.elapsed().as_millis() as u64,
        error.to_string(),
    )
}

fn header_blob(response: &reqwest::Response) -> HeaderBlob {
    HeaderBlob::from_pairs(
        response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default())),
    )
}

async fn status_err(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let body = match response.bytes().await {
        Ok(bytes) => {
            let end = bytes.len().min(ERROR_BODY_LIMIT);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Err(_) => String::new(),
    };
    Error::ProtocolStatus { status, url, body }
}
