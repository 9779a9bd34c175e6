//! SFS Common - Shared types and utilities
//!
//! This crate provides the data model, digest utilities, error definitions,
//! and configuration types used across all SFS components.

pub mod config;
pub mod digest;
pub mod error;
pub mod types;

pub use config::{ClientConfig, ReplicationConfig};
pub use digest::{DigestAlgo, DigestCalculator};
pub use error::{Error, Result};
pub use types::*;
