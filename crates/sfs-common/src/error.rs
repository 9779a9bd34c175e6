//! Error types for SFS
//!
//! One taxonomy is shared across the client, node, and rebalance layers so
//! the controller can classify failures uniformly when it downgrades them.
//! Invariant violations are deliberately absent: they are bugs and are
//! reported via `assert!`/`panic!`, never through this enum.

use thiserror::Error;

/// Common result type for SFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for SFS
#[derive(Debug, Error)]
pub enum Error {
    // Network errors
    #[error("transport error for {url} after {elapsed_ms}ms: {message}")]
    Transport {
        url: String,
        elapsed_ms: u64,
        message: String,
    },

    #[error("unexpected status {status} from {url}: {body}")]
    ProtocolStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("bad protocol body from {url}: {detail}")]
    ProtocolBody { url: String, detail: String },

    // Placement errors
    #[error("replica digests disagree across {targets:?}: {digests:?}")]
    DigestMismatch {
        targets: Vec<String>,
        digests: Vec<String>,
    },

    #[error("insufficient capacity: requested {requested} targets, obtained {obtained}")]
    InsufficientCapacity { requested: usize, obtained: usize },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    // Local storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Two concurrent pipelines failed; the first failure is authoritative
    /// and the second is chained so neither cause is lost
    #[error("{first}; second failure: {second}")]
    Chained { first: Box<Error>, second: Box<Error> },
}

impl Error {
    /// Create a transport error
    pub fn transport(
        url: impl Into<String>,
        elapsed_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            elapsed_ms,
            message: message.into(),
        }
    }

    /// Create a protocol body error
    pub fn protocol_body(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProtocolBody {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Chain a second concurrent failure onto the first
    #[must_use]
    pub fn chain(first: Error, second: Error) -> Self {
        Self::Chained {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Short classification tag, used when downgrading failures in logs
    ///
    /// A chained error classifies as its authoritative first failure.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::ProtocolStatus { .. } => "protocol-status",
            Self::ProtocolBody { .. } => "protocol-body",
            Self::DigestMismatch { .. } => "digest-mismatch",
            Self::InsufficientCapacity { .. } => "insufficient-capacity",
            Self::NodeNotFound(_) => "node-not-found",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
            Self::Chained { first, .. } => first.kind(),
        }
    }

    /// Check if a later rebalance pass may succeed without intervention
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::InsufficientCapacity { .. } | Self::Storage(_) => {
                true
            }
            Self::Chained { first, .. } => first.is_retryable(),
            _ => false,
        }
    }
}
