//! Configuration types for SFS
//!
//! This module defines configuration structures shared across components.
//! The blob daemon layers these under its command-line flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cluster-wide replication requirements
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Expected number of primary copies per segment
    pub number_of_primaries: u32,
    /// Default number of replica copies per segment (containers may override)
    pub number_of_replicas: u32,
    /// Allow several copies of one segment on distinct volumes of one node
    pub allow_same_node: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            number_of_primaries: 1,
            number_of_replicas: 0,
            allow_same_node: false,
        }
    }
}

/// Remote blob protocol client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Response timeout applied to every remote operation (milliseconds)
    pub response_timeout_ms: u64,
    /// Cluster shared secret; sent base64-encoded on every request
    pub remote_node_secret: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            remote_node_secret: String::new(),
        }
    }
}

impl ClientConfig {
    /// Response timeout as a [`Duration`]
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Keep-alive timeout advertised to peers, in seconds
    ///
    /// Half the response timeout, with a floor of one second.
    #[must_use]
    pub fn keep_alive_timeout_secs(&self) -> u64 {
        (self.response_timeout_ms / 2 / 1000).max(1)
    }
}
