//! Coordinator configuration
//!
//! Loaded from the environment at startup. The shared secret has no
//! default: a coordinator without one refuses to start.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::protocol::JobKind;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RANGE_SIZE: u64 = 100_000;
pub const DEFAULT_TARGET: &str = "00000";
pub const DEFAULT_ROLE_RESET_SECS: u64 = 5;

/// Configuration for the Coordinator server
#[derive(Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Shared secret every connection must present
    pub shared_secret: String,

    /// Units per assigned range
    pub range_size: u64,

    /// Search target sent along with every range
    pub target: String,

    /// Envelope kind used for range assignments
    pub job_kind: JobKind,

    /// Seconds before a worker busy with a command is shown idle again
    pub role_reset_secs: u64,

    /// Optional TOML file with extra command routes
    pub commands_file: Option<PathBuf>,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("bind_address", &self.bind_address)
            .field("shared_secret", &"<redacted>")
            .field("range_size", &self.range_size)
            .field("target", &self.target)
            .field("job_kind", &self.job_kind)
            .field("role_reset_secs", &self.role_reset_secs)
            .field("commands_file", &self.commands_file)
            .field("enable_cors", &self.enable_cors)
            .field("enable_request_logging", &self.enable_request_logging)
            .finish()
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = var("SCAVENGER_SECRET").ok_or_else(|| ConfigError::MissingField {
            field: "SCAVENGER_SECRET".to_string(),
        })?;

        let host = var("SCAVENGER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_var::<u16>(&var, "PORT")?.unwrap_or(DEFAULT_PORT);

        let mut builder = Self::builder()
            .bind_address_str(&format!("{}:{}", host, port))?
            .shared_secret(secret);

        if let Some(size) = parse_var::<u64>(&var, "SCAVENGER_RANGE_SIZE")? {
            builder = builder.range_size(size);
        }
        if let Some(target) = var("SCAVENGER_TARGET") {
            builder = builder.target(target);
        }
        if let Some(kind) = var("SCAVENGER_JOB_KIND") {
            let job_kind = JobKind::parse(&kind).ok_or_else(|| ConfigError::InvalidValue {
                field: "SCAVENGER_JOB_KIND".to_string(),
                reason: format!("Expected NEW_RANGE or MINING_JOB, got '{}'", kind),
            })?;
            builder = builder.job_kind(job_kind);
        }
        if let Some(secs) = parse_var::<u64>(&var, "SCAVENGER_ROLE_RESET_SECS")? {
            builder = builder.role_reset_secs(secs);
        }
        if let Some(path) = var("SCAVENGER_COMMANDS_FILE") {
            builder = builder.commands_file(path);
        }
        if let Some(enable) = parse_bool(&var, "SCAVENGER_CORS")? {
            builder = builder.enable_cors(enable);
        }
        if let Some(enable) = parse_bool(&var, "SCAVENGER_REQUEST_LOG")? {
            builder = builder.enable_request_logging(enable);
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_secret.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "shared_secret".to_string(),
            });
        }

        if self.range_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "range_size".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.target.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.role_reset_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "role_reset_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }

    pub fn role_reset_delay(&self) -> Duration {
        Duration::from_secs(self.role_reset_secs)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                reason: format!("Cannot parse '{}'", raw),
            }),
        None => Ok(None),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, ConfigError> {
    match var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            reason: format!("Expected a boolean, got '{}'", v),
        }),
        None => Ok(None),
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    bind_address: Option<SocketAddr>,
    shared_secret: Option<String>,
    range_size: Option<u64>,
    target: Option<String>,
    job_kind: Option<JobKind>,
    role_reset_secs: Option<u64>,
    commands_file: Option<PathBuf>,
    enable_cors: Option<bool>,
    enable_request_logging: Option<bool>,
}

impl CoordinatorConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            reason: format!("Invalid address: {}", addr),
        })?);
        Ok(self)
    }

    /// Set shared secret
    pub fn shared_secret(mut self, secret: impl Into<String>) -> Self {
        self.shared_secret = Some(secret.into());
        self
    }

    pub fn range_size(mut self, size: u64) -> Self {
        self.range_size = Some(size);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn job_kind(mut self, kind: JobKind) -> Self {
        self.job_kind = Some(kind);
        self
    }

    pub fn role_reset_secs(mut self, secs: u64) -> Self {
        self.role_reset_secs = Some(secs);
        self
    }

    pub fn commands_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.commands_file = Some(path.into());
        self
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        let config = CoordinatorConfig {
            bind_address: self
                .bind_address
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))),
            shared_secret: self.shared_secret.ok_or_else(|| ConfigError::MissingField {
                field: "shared_secret".to_string(),
            })?,
            range_size: self.range_size.unwrap_or(DEFAULT_RANGE_SIZE),
            target: self.target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            job_kind: self.job_kind.unwrap_or_default(),
            role_reset_secs: self.role_reset_secs.unwrap_or(DEFAULT_ROLE_RESET_SECS),
            commands_file: self.commands_file,
            enable_cors: self.enable_cors.unwrap_or(true),
            enable_request_logging: self.enable_request_logging.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}
