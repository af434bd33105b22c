//! fileferry library
//!
//! Minimal file transfer service: uploads are persisted under a freshly
//! allocated directory and addressed by a relative `allocation/filename`
//! reference; downloads resolve such references under a storage root without
//! ever leaving it.
//!
//! # Features
//!
//! - **Collision-free layout**: one exclusive directory per upload
//! - **Traversal-safe downloads**: literal `..` removal plus canonical
//!   containment check
//! - **Request correlation**: every request carries a random id through its
//!   log lines
//! - **Static mirrors**: read-only views of both roots
//!
//! # Example
//!
//! ```no_run
//! use fileferry::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod correlation;
pub mod download;
pub mod logging;
pub mod metrics;
pub mod mirror;
pub mod router;
pub mod server;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use storage::StorageReference;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
