//! Wire protocol for coordinator connections
//!
//! Every message is a JSON object whose `type` member names the kind.
//! Everything else is carried as opaque fields; the coordinator only looks
//! at the members it needs for routing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{ErrorCategory, ScavengerErrorTrait};

use super::allocator::Range;
use super::registry::WorkerRecord;

// ============================================================================
// Reserved Kinds
// ============================================================================

pub const REGISTER_WORKER: &str = "REGISTER_WORKER";
pub const REGISTER_OBSERVER: &str = "REGISTER_OBSERVER";
/// Observer registration kind used by older dashboards
pub const REGISTER_CLIENT: &str = "REGISTER_CLIENT";
pub const JOB_COMPLETE: &str = "JOB_COMPLETE";
/// Completion kind used by older workers
pub const TASK_COMPLETE: &str = "TASK_COMPLETE";
pub const STOP: &str = "STOP";
pub const STATS: &str = "STATS";

/// Kinds handled by the router itself; the command table may not reuse them
pub const RESERVED_KINDS: &[&str] = &[
    REGISTER_WORKER,
    REGISTER_OBSERVER,
    REGISTER_CLIENT,
    JOB_COMPLETE,
    TASK_COMPLETE,
    STOP,
    STATS,
    "NEW_RANGE",
    "MINING_JOB",
];

pub fn is_reserved(kind: &str) -> bool {
    RESERVED_KINDS.contains(&kind)
}

// ============================================================================
// Envelope
// ============================================================================

/// A tagged message: `{ "type": kind, ...fields }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Add a field, builder style
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Decode one inbound message
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            Some(_) => return Err(ProtocolError::InvalidKind),
            None => return Err(ProtocolError::MissingKind),
        };

        Ok(Self { kind, fields })
    }

    /// Encode as a single JSON line
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Re-tag the envelope for observers, naming the worker that produced it
    pub fn relay_as(&self, kind: &str, worker_identity: &str) -> Envelope {
        let mut fields = Map::with_capacity(self.fields.len() + 1);
        fields.insert("worker".to_string(), Value::String(worker_identity.to_string()));
        for (key, value) in &self.fields {
            if key != "worker" {
                fields.insert(key.clone(), value.clone());
            }
        }
        Envelope {
            kind: kind.to_string(),
            fields,
        }
    }

    /// The `solution` member of a completion report, if any
    ///
    /// Strings are taken as-is and numbers are rendered in decimal; empty
    /// strings and any other JSON type count as "no solution".
    pub fn solution(&self) -> Option<String> {
        match self.fields.get("solution") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// Kind of the envelope that carries a new range to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    #[default]
    NewRange,
    MiningJob,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRange => "NEW_RANGE",
            Self::MiningJob => "MINING_JOB",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW_RANGE" => Some(Self::NewRange),
            "MINING_JOB" => Some(Self::MiningJob),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state pushed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub workers: Vec<WorkerRecord>,
    pub observers: usize,
    pub total_units: u64,
    pub solution: Option<String>,
    pub cursor: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Messages the coordinator itself originates
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Work assignment for a worker
    Job {
        kind: JobKind,
        range: Range,
        target: String,
    },

    /// Search is over; the worker should stand by
    Stop { solution: String },

    Stats(StatsSnapshot),

    /// Opaque envelope forwarded by the router
    Forward(Envelope),
}

impl OutboundMessage {
    /// Wire kind of this message
    pub fn kind(&self) -> &str {
        match self {
            Self::Job { kind, .. } => kind.as_str(),
            Self::Stop { .. } => STOP,
            Self::Stats(_) => STATS,
            Self::Forward(envelope) => &envelope.kind,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let envelope = match self {
            Self::Job {
                kind,
                range,
                target,
            } => Envelope::new(kind.as_str())
                .with_field("start", range.start)
                .with_field("end", range.end)
                .with_field("target", target.clone()),
            Self::Stop { solution } => Envelope::new(STOP).with_field("solution", solution.clone()),
            Self::Stats(snapshot) => {
                let value = serde_json::to_value(snapshot)
                    .map_err(|e| ProtocolError::Encode(e.to_string()))?;
                let Value::Object(fields) = value else {
                    return Err(ProtocolError::Encode("stats snapshot is not an object".into()));
                };
                Envelope {
                    kind: STATS.to_string(),
                    fields,
                }
            }
            Self::Forward(envelope) => envelope.clone(),
        };
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        self.to_envelope()?.encode()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while decoding or encoding messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Message has no 'type' member")]
    MissingKind,

    #[error("Message 'type' must be a non-empty string")]
    InvalidKind,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl ScavengerErrorTrait for ProtocolError {
    /// Bad input from a peer is recoverable; failing to encode our own
    /// message is not
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Protocol
    }
}

// ============================================================================
// Tests
// ============================================================================
