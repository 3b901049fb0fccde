//! Connection registry for workers and observers
//!
//! Every admitted connection lives here until it closes. A connection is
//! pending until it registers, then it is either a worker or an observer,
//! never both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use super::protocol::{OutboundMessage, ProtocolError};

/// Sending half of a connection's outbound queue
pub type Outbox = mpsc::UnboundedSender<String>;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable handle for an admitted connection
///
/// Ids are allocated from a counter and never reused, so a stale id can
/// only ever miss, never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Short random display identity, e.g. `3f9a1c`
fn generate_identity() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(6);
    id
}

// ============================================================================
// Worker Role
// ============================================================================

/// What a worker is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRole {
    /// Registered, first assignment not yet pushed
    #[default]
    Connecting,

    /// Grinding through a range
    AssignedRange,

    /// Running a command dispatched by an observer
    ExecutingCommand,

    /// Nothing to do (search solved or command finished)
    Idle,
}

impl WorkerRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AssignedRange => "assigned range",
            Self::ExecutingCommand => "executing command",
            Self::Idle => "idle",
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Read-only view of a worker, as published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: String,
    pub address: String,
    pub role: WorkerRole,
    pub connected_at: DateTime<Utc>,
    pub ranges_completed: u64,
}

#[derive(Debug, Clone, Default)]
struct WorkerState {
    role: WorkerRole,
    ranges_completed: u64,
    /// Bumped on every dispatched command; guards delayed role resets
    command_seq: u64,
}

#[derive(Debug, Clone)]
enum ConnectionKind {
    Pending,
    Worker(WorkerState),
    Observer,
}

/// Membership of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Pending,
    Worker,
    Observer,
}

#[derive(Debug)]
struct ConnectionEntry {
    identity: String,
    remote_address: String,
    connected_at: DateTime<Utc>,
    outbox: Outbox,
    kind: ConnectionKind,
}

impl ConnectionEntry {
    fn membership(&self) -> Membership {
        match self.kind {
            ConnectionKind::Pending => Membership::Pending,
            ConnectionKind::Worker(_) => Membership::Worker,
            ConnectionKind::Observer => Membership::Observer,
        }
    }

    fn worker_record(&self) -> Option<WorkerRecord> {
        match &self.kind {
            ConnectionKind::Worker(state) => Some(WorkerRecord {
                id: self.identity.clone(),
                address: self.remote_address.clone(),
                role: state.role,
                connected_at: self.connected_at,
                ranges_completed: state.ranges_completed,
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Owned copy of the registry for publishing
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySnapshot {
    /// Workers in admission order
    pub workers: Vec<WorkerRecord>,
    pub observers: usize,
    pub pending: usize,
}

// ============================================================================
// Connection Registry
// ============================================================================

/// Registry of all live connections
///
/// Not internally synchronized; the router owns it behind a single lock
/// together with the allocator.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Keyed by id so iteration follows admission order
    connections: BTreeMap<ConnectionId, ConnectionEntry>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection in the pending state
    pub fn admit(&mut self, remote_address: impl Into<String>, outbox: Outbox) -> (ConnectionId, String) {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let identity = generate_identity();

        self.connections.insert(
            id,
            ConnectionEntry {
                identity: identity.clone(),
                remote_address: remote_address.into(),
                connected_at: Utc::now(),
                outbox,
                kind: ConnectionKind::Pending,
            },
        );

        (id, identity)
    }

    /// Promote a connection to worker with role `Connecting`
    ///
    /// Observer membership is dropped. Re-registering an existing worker
    /// keeps its counters. Returns false if the connection is unknown.
    pub fn register_worker(&mut self, id: ConnectionId) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };

        match &mut entry.kind {
            ConnectionKind::Worker(state) => state.role = WorkerRole::Connecting,
            kind => *kind = ConnectionKind::Worker(WorkerState::default()),
        }
        true
    }

    /// Mark a connection as observer, dropping any worker record
    pub fn register_observer(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) => {
                entry.kind = ConnectionKind::Observer;
                true
            }
            None => false,
        }
    }

    /// Update a worker's role; no-op unless the connection is a live worker
    pub fn set_role(&mut self, id: ConnectionId, role: WorkerRole) -> bool {
        match self.worker_mut(id) {
            Some(state) => {
                state.role = role;
                true
            }
            None => false,
        }
    }

    /// Move a worker into `ExecutingCommand` and return the dispatch sequence
    pub fn begin_command(&mut self, id: ConnectionId) -> Option<u64> {
        let state = self.worker_mut(id)?;
        state.command_seq += 1;
        state.role = WorkerRole::ExecutingCommand;
        Some(state.command_seq)
    }

    /// Reset a worker to `Idle` if it is still running the given command
    ///
    /// Returns false when the worker is gone, has moved on to another role,
    /// or a newer command has been dispatched since.
    pub fn finish_command(&mut self, id: ConnectionId, seq: u64) -> bool {
        match self.worker_mut(id) {
            Some(state) if state.command_seq == seq && state.role == WorkerRole::ExecutingCommand => {
                state.role = WorkerRole::Idle;
                true
            }
            _ => false,
        }
    }

    /// Count a completed range against a worker
    pub fn record_completed_range(&mut self, id: ConnectionId) -> bool {
        match self.worker_mut(id) {
            Some(state) => {
                state.ranges_completed += 1;
                true
            }
            None => false,
        }
    }

    /// Remove a connection from every role; idempotent
    pub fn remove(&mut self, id: ConnectionId) -> Option<Membership> {
        self.connections.remove(&id).map(|entry| entry.membership())
    }

    pub fn membership(&self, id: ConnectionId) -> Option<Membership> {
        self.connections.get(&id).map(ConnectionEntry::membership)
    }

    pub fn is_worker(&self, id: ConnectionId) -> bool {
        self.membership(id) == Some(Membership::Worker)
    }

    pub fn is_observer(&self, id: ConnectionId) -> bool {
        self.membership(id) == Some(Membership::Observer)
    }

    pub fn role(&self, id: ConnectionId) -> Option<WorkerRole> {
        match &self.connections.get(&id)?.kind {
            ConnectionKind::Worker(state) => Some(state.role),
            _ => None,
        }
    }

    pub fn identity(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).map(|entry| entry.identity.as_str())
    }

    /// Worker ids in admission order
    pub fn worker_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, entry)| matches!(entry.kind, ConnectionKind::Worker(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Outboxes of every observer
    pub fn observer_outboxes(&self) -> Vec<(ConnectionId, Outbox)> {
        self.connections
            .iter()
            .filter(|(_, entry)| matches!(entry.kind, ConnectionKind::Observer))
            .map(|(id, entry)| (*id, entry.outbox.clone()))
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.connections
            .values()
            .filter(|entry| matches!(entry.kind, ConnectionKind::Worker(_)))
            .count()
    }

    pub fn observer_count(&self) -> usize {
        self.connections
            .values()
            .filter(|entry| matches!(entry.kind, ConnectionKind::Observer))
            .count()
    }

    /// Total admitted connections, including pending ones
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a message for one connection
    pub fn send(&self, id: ConnectionId, message: &OutboundMessage) -> Result<bool, ProtocolError> {
        let Some(entry) = self.connections.get(&id) else {
            return Ok(false);
        };
        let text = message.encode()?;
        Ok(entry.outbox.send(text).is_ok())
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot {
            workers: Vec::new(),
            observers: 0,
            pending: 0,
        };

        for entry in self.connections.values() {
            match entry.membership() {
                Membership::Worker => snapshot.workers.extend(entry.worker_record()),
                Membership::Observer => snapshot.observers += 1,
                Membership::Pending => snapshot.pending += 1,
            }
        }

        snapshot
    }

    fn worker_mut(&mut self, id: ConnectionId) -> Option<&mut WorkerState> {
        match &mut self.connections.get_mut(&id)?.kind {
            ConnectionKind::Worker(state) => Some(state),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
