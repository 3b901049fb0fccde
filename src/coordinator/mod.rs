//! Coordinator for distributed brute-force search
//!
//! This module provides the central server that workers and dashboard
//! observers connect to. It hands out disjoint ranges of the search
//! space, routes observer commands to workers and relays their results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            Coordinator Server            │
//! │                                          │
//! │  GET /ws?token=...   ──► Access Gate     │
//! │                            │             │
//! │                            ▼             │
//! │  ┌────────────────────────────────────┐  │
//! │  │          Command Router            │  │
//! │  │  ┌──────────────┐ ┌─────────────┐  │  │
//! │  │  │  Connection  │ │    Range    │  │  │
//! │  │  │   Registry   │ │  Allocator  │  │  │
//! │  │  └──────────────┘ └─────────────┘  │  │
//! │  │       (one lock around both)       │  │
//! │  └────────────────────────────────────┘  │
//! │                    │                     │
//! │                    ▼                     │
//! │          Stats Publisher ──► observers   │
//! │                                          │
//! │  GET /api/health   GET /api/stats        │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scavenger::coordinator::{CoordinatorServer, CoordinatorConfig};
//!
//! let config = CoordinatorConfig::from_env()?;
//! let server = CoordinatorServer::new(config)?;
//! server.start().await?;
//! ```

pub mod allocator;
pub mod api;
pub mod commands;
pub mod config;
pub mod gate;
pub mod protocol;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod server;
pub mod socket;

// Re-export main types
pub use allocator::{Range, RangeAllocator, SolutionOutcome};
pub use commands::{CommandTable, SelectionPolicy};
pub use config::CoordinatorConfig;
pub use gate::AccessGate;
pub use protocol::{Envelope, JobKind, OutboundMessage, StatsSnapshot};
pub use registry::{ConnectionId, ConnectionRegistry, Membership, WorkerRecord, WorkerRole};
pub use router::{CommandRouter, Disposition, IgnoreReason, RouterSettings};
pub use server::{AppState, CoordinatorServer, ServerInfo};
