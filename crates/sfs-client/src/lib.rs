//! SFS Client - remote blob protocol client
//!
//! Typed operations against a peer node's `/blob/001` endpoints. One client
//! instance binds a peer's identity and endpoint to a shared HTTP connection
//! pool; every request carries the cluster token and the instance's response
//! timeout. This layer never retries: failures surface verbatim so the
//! rebalance controller can classify and downgrade them.

mod remote;

pub use remote::RemoteBlobClient;
