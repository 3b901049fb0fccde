//! Coordinator server implementation
//!
//! This module wires the access gate, the command router and the HTTP
//! routes into one axum server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{body::Body, http::Request, Router};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::error::{ErrorCategory, Result, ScavengerErrorTrait};

use super::api::create_router;
use super::commands::CommandTable;
use super::config::CoordinatorConfig;
use super::gate::AccessGate;
use super::router::CommandRouter;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Envelope router (owns registry and allocator)
    pub router: CommandRouter,

    /// Shared-secret check for new connections
    pub gate: Arc<AccessGate>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: Arc<CoordinatorConfig>,
}

// ============================================================================
// Coordinator Server
// ============================================================================

/// Main Coordinator server
pub struct CoordinatorServer {
    config: CoordinatorConfig,
    state: AppState,
}

impl CoordinatorServer {
    /// Create a new coordinator server
    ///
    /// Loads the command table named in the config, if any, over the
    /// built-in routes.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let commands = match &config.commands_file {
            Some(path) => CommandTable::from_file(path)?,
            None => CommandTable::builtin(),
        };

        Ok(Self::with_commands(config, commands))
    }

    /// Create a server with an explicit command table
    pub fn with_commands(config: CoordinatorConfig, commands: CommandTable) -> Self {
        let state = AppState {
            router: CommandRouter::from_config(&config, commands),
            gate: Arc::new(AccessGate::new(&config.shared_secret)),
            start_time: Instant::now(),
            config: Arc::new(config.clone()),
        };

        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http().make_span_with(request_span));
        }

        router
    }

    /// Start the server
    pub async fn start(&self) -> Result<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        self.serve(listener, shutdown_signal).await
    }

    /// Serve on an already bound listener until the shutdown signal fires
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.build_router();
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(
            address = %addr,
            range_size = self.config.range_size,
            job_kind = %self.config.job_kind,
            "Coordinator listening"
        );

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Coordinator server shutdown complete");
        Ok(())
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            range_size: self.config.range_size,
            target: self.config.target.clone(),
            job_kind: self.config.job_kind.to_string(),
            role_reset_secs: self.config.role_reset_secs,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Request span carrying the path only
///
/// The socket token travels in the query string, so the full URI must
/// never reach a log line.
fn request_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    )
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub range_size: u64,
    pub target: String,
    pub job_kind: String,
    pub role_reset_secs: u64,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Coordinator Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Shared Secret: <redacted>\n\
             Range Size: {}\n\
             Target: {}\n\
             Job Kind: {}\n\
             Role Reset: {}s\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.range_size,
            self.target,
            self.job_kind,
            self.role_reset_secs,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind: {0}")]
    Bind(String),

    /// Server error
    #[error("Server error: {0}")]
    Serve(String),
}

impl ScavengerErrorTrait for ServerError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

// ============================================================================
// Tests
// ============================================================================
