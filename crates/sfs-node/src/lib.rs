//! SFS Node - uniform capability surface over cluster nodes
//!
//! The rebalance core addresses every node through [`XNode`], whether the
//! blobs live behind a network hop or on this process's own volumes. The
//! local/remote choice happens exactly once, at directory lookup; nothing
//! downstream branches on the variant.

mod directory;
mod local;
mod remote;
mod xnode;

pub use directory::{ClusterDirectory, NodeDirectory};
pub use local::LocalNode;
pub use remote::RemoteNode;
pub use xnode::XNode;
