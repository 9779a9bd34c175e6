//! Digest utilities for SFS
//!
//! Blob copies are content-addressed: digest equality is the sole proof that
//! two byte sequences are identical for placement purposes. Algorithms are
//! identified by short lowercase tags on the wire (`sha512`, `sha256`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms
///
/// `sha512` is mandatory cluster-wide; `sha256` may be requested in addition.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgo {
    Sha512,
    Sha256,
}

impl DigestAlgo {
    /// Wire tag for the algorithm
    #[must_use]
    pub const fn as_tag(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
        }
    }

    /// Digest output length in bytes
    #[must_use]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha512 => 64,
            Self::Sha256 => 32,
        }
    }
}

impl fmt::Display for DigestAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for DigestAlgo {
    type Err = UnknownDigestAlgo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha512" => Ok(Self::Sha512),
            "sha256" => Ok(Self::Sha256),
            _ => Err(UnknownDigestAlgo(s.to_string())),
        }
    }
}

/// Error returned when parsing an unsupported algorithm tag
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown digest algorithm: {0}")]
pub struct UnknownDigestAlgo(pub String);

enum AlgoState {
    Sha512(Box<Sha512>),
    Sha256(Box<Sha256>),
}

impl AlgoState {
    fn new(algo: DigestAlgo) -> Self {
        match algo {
            DigestAlgo::Sha512 => Self::Sha512(Box::new(Sha512::new())),
            DigestAlgo::Sha256 => Self::Sha256(Box::new(Sha256::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha512(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> (DigestAlgo, Vec<u8>) {
        match self {
            Self::Sha512(h) => (DigestAlgo::Sha512, h.finalize().to_vec()),
            Self::Sha256(h) => (DigestAlgo::Sha256, h.finalize().to_vec()),
        }
    }
}

/// Streaming multi-algorithm digest calculator
///
/// Feeds every chunk to all requested algorithms so a payload is hashed in a
/// single pass while it streams.
pub struct DigestCalculator {
    states: Vec<AlgoState>,
}

impl DigestCalculator {
    /// Create a calculator for the given algorithms
    ///
    /// Duplicate algorithms are collapsed; an empty list yields an empty
    /// digest map.
    #[must_use]
    pub fn new(algos: &[DigestAlgo]) -> Self {
        let mut seen = Vec::new();
        for algo in algos {
            if !seen.contains(algo) {
                seen.push(*algo);
            }
        }
        Self {
            states: seen.into_iter().map(AlgoState::new).collect(),
        }
    }

    /// Update all algorithms with more data
    pub fn update(&mut self, data: &[u8]) {
        for state in &mut self.states {
            state.update(data);
        }
    }

    /// Finalize and return the computed digests, by algorithm
    #[must_use]
    pub fn finalize(self) -> BTreeMap<DigestAlgo, Vec<u8>> {
        self.states.into_iter().map(AlgoState::finalize).collect()
    }

    /// Finalize and return lowercase hex digests, by algorithm
    #[must_use]
    pub fn finalize_hex(self) -> BTreeMap<DigestAlgo, String> {
        self.finalize()
            .into_iter()
            .map(|(algo, bytes)| (algo, hex::encode(bytes)))
            .collect()
    }
}

/// One-shot digest of an in-memory payload
#[must_use]
pub fn digest(algo: DigestAlgo, data: &[u8]) -> Vec<u8> {
    let mut calc = DigestCalculator::new(&[algo]);
    calc.update(data);
    calc.finalize().remove(&algo).unwrap_or_default()
}
