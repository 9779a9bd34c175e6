//! JSON envelope and blob shapes of the `/blob/001` protocol

use serde::{Deserialize, Serialize};
use sfs_common::{BlobRole, DigestAlgo, Error, Result, VolumeId};
use std::collections::BTreeMap;

/// Base path of the blob protocol
pub const BLOB_PATH: &str = "/blob/001";

/// Checksum endpoint path
pub const CHECKSUM_PATH: &str = "/blob/001/checksum";

/// Acknowledge endpoint path
pub const ACK_PATH: &str = "/blob/001/ack";

/// Capacity probe endpoint path
pub const CANPUT_PATH: &str = "/blob/001/canput";

/// Request header carrying the base64-encoded cluster secret
pub const TOKEN_HEADER: &str = "X-SFS-Remote-Node-Token";

/// Query parameter names, bit-exact across all peers
pub mod query {
    pub const NODE: &str = "node";
    pub const VOLUME: &str = "volume";
    pub const POSITION: &str = "position";
    pub const OFFSET: &str = "offset";
    pub const LENGTH: &str = "length";
    pub const KEEP_ALIVE_TIMEOUT: &str = "keep_alive_timeout";

    /// Name of the flag requesting a computed digest for `algo`
    #[must_use]
    pub fn computed_digest(algo: sfs_common::DigestAlgo) -> String {
        format!("x-computed-digest-{algo}")
    }

    /// Parse a computed-digest flag name back into its algorithm
    #[must_use]
    pub fn parse_computed_digest(name: &str) -> Option<sfs_common::DigestAlgo> {
        name.strip_prefix("x-computed-digest-")?.parse().ok()
    }
}

/// Digest-bearing blob description
///
/// Returned by the checksum endpoint and as the single-shot receipt of a
/// completed write stream. Digests are lowercase hex, keyed by algorithm
/// tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestBlob {
    /// Volume holding the blob
    pub volume: VolumeId,
    /// Blob counts against the primary target
    #[serde(default)]
    pub primary: bool,
    /// Blob counts against the replica target
    #[serde(default)]
    pub replica: bool,
    /// Position of the blob on the volume
    pub position: u64,
    /// Payload length in bytes
    pub length: u64,
    /// Lowercase hex digests by algorithm
    pub digests: BTreeMap<DigestAlgo, String>,
}

impl DigestBlob {
    /// Hex digest for the given algorithm, if present
    #[must_use]
    pub fn digest_hex(&self, algo: DigestAlgo) -> Option<&str> {
        self.digests.get(&algo).map(String::as_str)
    }

    /// Decoded digest bytes for the given algorithm
    pub fn digest_bytes(&self, algo: DigestAlgo) -> Result<Vec<u8>> {
        let hex_value = self
            .digest_hex(algo)
            .ok_or_else(|| Error::protocol_body("", format!("receipt lacks {algo} digest")))?;
        hex::decode(hex_value)
            .map_err(|e| Error::protocol_body("", format!("bad {algo} digest hex: {e}")))
    }

    /// Role encoded by the primary/replica flags
    #[must_use]
    pub fn role(&self) -> BlobRole {
        if self.primary {
            BlobRole::Primary
        } else {
            BlobRole::Replica
        }
    }

    /// Set the primary/replica flags from a role
    pub fn set_role(&mut self, role: BlobRole) {
        self.primary = role == BlobRole::Primary;
        self.replica = role == BlobRole::Replica;
    }
}

/// JSON response envelope of the blob protocol
///
/// Every JSON-returning endpoint answers `{code, blob}`; a body without a
/// `code` member is a protocol error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DigestEnvelope {
    /// Protocol-level result code (200, 404, ...)
    pub code: u16,
    /// Blob description, present when `code` is 200
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<DigestBlob>,
}

impl DigestEnvelope {
    /// Envelope for a found blob
    #[must_use]
    pub fn found(blob: DigestBlob) -> Self {
        Self {
            code: 200,
            blob: Some(blob),
        }
    }

    /// Envelope for an absent blob
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            code: 404,
            blob: None,
        }
    }

    /// Parse an envelope from a response body
    ///
    /// A body that is not UTF-8 JSON of this shape (including one missing
    /// `code`) fails with a protocol-body error carrying the request URL.
    pub fn parse(url: &str, body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::protocol_body(url, format!("bad envelope: {e}")))
    }

    /// Interpret the envelope as found/absent, anything else failing
    ///
    /// `code` 200 requires a blob; 404 maps to `None`; any other code is a
    /// protocol error.
    pub fn into_optional_blob(self, url: &str) -> Result<Option<DigestBlob>> {
        match self.code {
            200 => match self.blob {
                Some(blob) => Ok(Some(blob)),
                None => Err(Error::protocol_body(url, "code 200 without blob")),
            },
            404 => Ok(None),
            other => Err(Error::protocol_body(url, format!("unexpected code {other}"))),
        }
    }
}

/// Response headers captured from a delete or acknowledge call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBlob {
    headers: BTreeMap<String, String>,
}

impl HeaderBlob {
    /// Capture headers from name/value pairs; names are lowercased
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            headers: pairs
                .into_iter()
                .map(|(n, v)| (n.as_ref().to_ascii_lowercase(), v.as_ref().to_string()))
                .collect(),
        }
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
