//! scavenger - brute-force search coordinator
//!
//! Workers connect over WebSocket and are kept busy with disjoint ranges
//! of an unbounded integer search space until one of them reports a
//! solution. Dashboard observers watch live stats and can send commands
//! that are fanned out to workers.
//!
//! # Architecture
//!
//! - [`coordinator`] - Registry, range allocator, command router and server
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use scavenger::coordinator::{CoordinatorConfig, CoordinatorServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CoordinatorConfig::from_env()?;
//!     let server = CoordinatorServer::new(config)?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod error;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::coordinator::{
        CommandRouter, CommandTable, CoordinatorConfig, CoordinatorServer, Envelope, Range,
        WorkerRole,
    };
    pub use crate::error::{Error, ErrorCategory, Result, ScavengerErrorTrait};
}
