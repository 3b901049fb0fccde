//! Unified error handling for the scavenger crate
//!
//! This module provides a unified error type that consolidates the
//! coordinator's module errors into a single `Error` enum, while keeping
//! the module errors available for callers that want the detail.
//!
//! # Architecture
//!
//! - [`ScavengerErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping the module errors
//!
//! Only configuration and bind failures are fatal to the process; every
//! other error is local to one connection or one message, and
//! [`log_dropped`] picks its log level from the category.

use std::fmt::Display;

use thiserror::Error;

pub use crate::coordinator::commands::CommandTableError;
pub use crate::coordinator::config::ConfigError;
pub use crate::coordinator::gate::GateError;
pub use crate::coordinator::protocol::ProtocolError;
pub use crate::coordinator::server::ServerError;

/// Common trait for all scavenger error types
pub trait ScavengerErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the process can keep running)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket, bind and serve errors
    Network,
    /// Malformed or unencodable messages
    Protocol,
    /// Rejected tokens
    Auth,
    /// Configuration and command table errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Auth => "auth",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the scavenger crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command table error: {0}")]
    Commands(#[from] CommandTableError),

    #[error("Access denied: {0}")]
    Gate(#[from] GateError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

impl ScavengerErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Commands(_) => false,
            Self::Gate(e) => e.is_recoverable(),
            Self::Protocol(e) => e.is_recoverable(),
            Self::Server(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::Commands(_) => ErrorCategory::Config,
            Self::Gate(e) => e.category(),
            Self::Protocol(e) => e.category(),
            Self::Server(e) => e.category(),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Log an error that cost one connection a message or a handshake
///
/// Recoverable errors are caused by the peer and go to warn. Anything
/// else means the coordinator itself misbehaved and goes to error.
pub fn log_dropped<E: ScavengerErrorTrait>(peer: impl Display, err: &E, context: &str) {
    if err.is_recoverable() {
        tracing::warn!(peer = %peer, category = %err.category(), error = %err, "{}", context);
    } else {
        tracing::error!(peer = %peer, category = %err.category(), error = %err, "{}", context);
    }
}
