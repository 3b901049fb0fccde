//! Access gate for incoming connections
//!
//! A single pre-shared token, checked once when the connection is opened.
//! Tokens are compared through their SHA-256 digests so the comparison
//! time does not depend on how many leading bytes match.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{ErrorCategory, ScavengerErrorTrait};

/// Shared-secret check applied before a connection is admitted
#[derive(Clone)]
pub struct AccessGate {
    secret_digest: [u8; 32],
}

impl AccessGate {
    /// Create a gate for the given secret
    ///
    /// Only the digest is kept; the secret itself is dropped here.
    pub fn new(secret: &str) -> Self {
        Self {
            secret_digest: digest(secret),
        }
    }

    /// Check a caller-supplied token
    pub fn check(&self, token: Option<&str>) -> Result<(), GateError> {
        let token = token.ok_or(GateError::MissingToken)?;
        let candidate = digest(token);

        let diff = self
            .secret_digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(())
        } else {
            Err(GateError::InvalidToken)
        }
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").finish_non_exhaustive()
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

/// Reasons a connection is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Connection did not present a token")]
    MissingToken,

    #[error("Connection presented an invalid token")]
    InvalidToken,
}

impl ScavengerErrorTrait for GateError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Auth
    }
}
