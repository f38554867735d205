//! Mutuals Node - roster daemon
//!
//! Hosts the mutual-match engine over persistent storage and exposes it to
//! member clients and operators.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed member store and report log
//! - **Node**: configuration and process wiring
//! - **API**: HTTP endpoints for signup, crush and identity updates
//! - **Admin Socket**: Unix socket for local admin commands (mutuals-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use mutuals_node::{MutualsNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = MutualsNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod storage;
pub mod node;
pub mod api;
pub mod admin_socket;
pub mod error;

pub use storage::Storage;
pub use node::{MutualsNode, NodeConfig, NodeState};
pub use error::{Error, Result};
