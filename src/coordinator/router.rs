//! Command router
//!
//! Owns the registry and the allocator behind one lock. Every inbound
//! event (connect, message, close) is handled to completion under that
//! lock, so registry and allocator always change together. Outbound
//! messages go through per-connection unbounded channels and never wait
//! on the peer.
//!
//! The only deferred work is the role reset after a dispatched command,
//! which re-checks the worker under the lock before touching it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error;

use super::allocator::{Range, RangeAllocator, SolutionOutcome};
use super::commands::{CommandTable, SelectionPolicy};
use super::config::CoordinatorConfig;
use super::protocol::{self, Envelope, JobKind, OutboundMessage, StatsSnapshot};
use super::publisher;
use super::registry::{ConnectionId, ConnectionRegistry, Membership, Outbox, WorkerRole};

// ============================================================================
// Settings
// ============================================================================

/// Router behaviour taken from the coordinator config
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub range_size: u64,
    pub target: String,
    pub job_kind: JobKind,
    pub role_reset_delay: Duration,
}

impl From<&CoordinatorConfig> for RouterSettings {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            range_size: config.range_size,
            target: config.target.clone(),
            job_kind: config.job_kind,
            role_reset_delay: config.role_reset_delay(),
        }
    }
}

// ============================================================================
// Disposition
// ============================================================================

/// Why an envelope was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The connection is no longer registered
    Stale,

    /// Worker-only kind sent by something else
    NotAWorker,

    /// Observer-only kind sent by something else
    NotAnObserver,

    /// Nothing routes this kind
    UnknownKind,
}

/// What the router did with one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Worker registered or completed; a new range was pushed
    RangeAssigned(Range),

    /// Worker registered or completed after the search was solved
    Halted,

    ObserverRegistered,

    /// Command forwarded to this many workers (zero when none were registered)
    Dispatched { targets: usize },

    /// Result forwarded to this many observers
    Relayed { observers: usize },

    Ignored(IgnoreReason),
}

// ============================================================================
// Command Router
// ============================================================================

struct Core {
    registry: ConnectionRegistry,
    allocator: RangeAllocator,
}

impl Core {
    fn publish(&self) {
        publisher::publish(&self.registry, &self.allocator);
    }
}

/// Routes envelopes between workers and observers
#[derive(Clone)]
pub struct CommandRouter {
    core: Arc<Mutex<Core>>,
    commands: Arc<CommandTable>,
    settings: Arc<RouterSettings>,
}

impl CommandRouter {
    pub fn new(settings: RouterSettings, commands: CommandTable) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                registry: ConnectionRegistry::new(),
                allocator: RangeAllocator::new(settings.range_size),
            })),
            commands: Arc::new(commands),
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(config: &CoordinatorConfig, commands: CommandTable) -> Self {
        Self::new(RouterSettings::from(config), commands)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Admit a connection that passed the access gate
    pub async fn connect(&self, remote_address: impl Into<String>, outbox: Outbox) -> (ConnectionId, String) {
        let mut core = self.core.lock().await;
        let remote_address = remote_address.into();
        let (id, identity) = core.registry.admit(remote_address.clone(), outbox);

        tracing::debug!(conn = %id, identity = %identity, remote = %remote_address, "Connection admitted");
        (id, identity)
    }

    /// Deregister a closed connection and publish once
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut core = self.core.lock().await;

        match core.registry.remove(id) {
            Some(Membership::Worker) => tracing::info!(conn = %id, "Worker left"),
            Some(Membership::Observer) => tracing::info!(conn = %id, "Observer left"),
            Some(Membership::Pending) => tracing::debug!(conn = %id, "Unregistered connection closed"),
            None => tracing::debug!(conn = %id, "Connection already removed"),
        }

        core.publish();
    }

    /// Decode and route a text frame
    ///
    /// A frame holding one JSON object is routed as is, however it is
    /// formatted. Otherwise it is read as one envelope per non-empty line.
    /// Malformed lines are logged and dropped; the connection stays open
    /// and gets no reply.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) -> Vec<Disposition> {
        let frame = text.trim();
        if frame.is_empty() {
            return Vec::new();
        }

        if let Ok(envelope) = Envelope::decode(frame) {
            return vec![self.handle_envelope(id, envelope).await];
        }

        let mut dispositions = Vec::new();
        for line in frame.lines().filter(|l| !l.trim().is_empty()) {
            match Envelope::decode(line) {
                Ok(envelope) => dispositions.push(self.handle_envelope(id, envelope).await),
                Err(e) => error::log_dropped(id, &e, "Dropping malformed message"),
            }
        }

        dispositions
    }

    /// Route one decoded envelope
    pub async fn handle_envelope(&self, id: ConnectionId, envelope: Envelope) -> Disposition {
        let mut core = self.core.lock().await;

        if core.registry.membership(id).is_none() {
            tracing::debug!(conn = %id, kind = %envelope.kind, "Message from unknown connection");
            return Disposition::Ignored(IgnoreReason::Stale);
        }

        match envelope.kind.as_str() {
            protocol::REGISTER_WORKER => self.register_worker(&mut core, id),
            protocol::REGISTER_OBSERVER | protocol::REGISTER_CLIENT => self.register_observer(&mut core, id),
            protocol::JOB_COMPLETE | protocol::TASK_COMPLETE => self.complete(&mut core, id, &envelope),
            kind => {
                if let Some(forward_as) = self.commands.relay(kind) {
                    self.relay(&mut core, id, &envelope, forward_as)
                } else if let Some(policy) = self.commands.command(kind) {
                    self.dispatch(&mut core, id, &envelope, policy)
                } else {
                    tracing::debug!(conn = %id, kind = %kind, "Ignoring unknown message kind");
                    Disposition::Ignored(IgnoreReason::UnknownKind)
                }
            }
        }
    }

    /// Current stats, as observers see them
    pub async fn snapshot(&self) -> StatsSnapshot {
        let core = self.core.lock().await;
        publisher::capture(&core.registry, &core.allocator)
    }

    /// Push stats to every observer now
    pub async fn publish(&self) {
        self.core.lock().await.publish();
    }

    pub async fn is_solved(&self) -> bool {
        self.core.lock().await.allocator.is_solved()
    }

    pub async fn role(&self, id: ConnectionId) -> Option<WorkerRole> {
        self.core.lock().await.registry.role(id)
    }

    pub async fn membership(&self, id: ConnectionId) -> Option<Membership> {
        self.core.lock().await.registry.membership(id)
    }

    // ------------------------------------------------------------------------
    // Handlers (called with the lock held)
    // ------------------------------------------------------------------------

    fn register_worker(&self, core: &mut Core, id: ConnectionId) -> Disposition {
        core.registry.register_worker(id);
        tracing::info!(
            conn = %id,
            identity = %core.registry.identity(id).unwrap_or_default(),
            "Worker joined"
        );

        let disposition = self.assign_next(core, id);
        core.publish();
        disposition
    }

    fn register_observer(&self, core: &mut Core, id: ConnectionId) -> Disposition {
        core.registry.register_observer(id);
        tracing::info!(conn = %id, "Observer joined");

        core.publish();
        Disposition::ObserverRegistered
    }

    fn complete(&self, core: &mut Core, id: ConnectionId, envelope: &Envelope) -> Disposition {
        if !core.registry.is_worker(id) {
            tracing::debug!(conn = %id, "Completion from a connection that is not a worker");
            return Disposition::Ignored(IgnoreReason::NotAWorker);
        }

        core.allocator.record_completion(self.settings.range_size);
        core.registry.record_completed_range(id);

        if let Some(solution) = envelope.solution() {
            match core.allocator.report_solution(solution.clone()) {
                SolutionOutcome::Accepted => {
                    tracing::info!(conn = %id, solution = %solution, "Solution found")
                }
                SolutionOutcome::Duplicate => {
                    tracing::debug!(conn = %id, "Solution reported again")
                }
                SolutionOutcome::Conflicting { existing } => tracing::warn!(
                    conn = %id,
                    existing = %existing,
                    reported = %solution,
                    "Dropping conflicting solution report"
                ),
            }
        }

        let disposition = self.assign_next(core, id);
        core.publish();
        disposition
    }

    /// Push the next range, or STOP once the search is solved
    fn assign_next(&self, core: &mut Core, id: ConnectionId) -> Disposition {
        let solution = core.allocator.solution().map(str::to_string);
        let (message, role, disposition) = match solution {
            Some(solution) => (
                OutboundMessage::Stop { solution },
                WorkerRole::Idle,
                Disposition::Halted,
            ),
            None => {
                let range = core.allocator.next_range();
                (
                    OutboundMessage::Job {
                        kind: self.settings.job_kind,
                        range,
                        target: self.settings.target.clone(),
                    },
                    WorkerRole::AssignedRange,
                    Disposition::RangeAssigned(range),
                )
            }
        };

        core.registry.set_role(id, role);
        self.send(core, id, &message);
        disposition
    }

    fn dispatch(
        &self,
        core: &mut Core,
        id: ConnectionId,
        envelope: &Envelope,
        policy: SelectionPolicy,
    ) -> Disposition {
        if !core.registry.is_observer(id) {
            tracing::debug!(conn = %id, kind = %envelope.kind, "Command from a connection that is not an observer");
            return Disposition::Ignored(IgnoreReason::NotAnObserver);
        }

        let workers = core.registry.worker_ids();
        let targets = policy.select(&workers, &mut rand::thread_rng());

        if targets.is_empty() {
            tracing::debug!(kind = %envelope.kind, policy = %policy, "No workers for command");
            return Disposition::Dispatched { targets: 0 };
        }

        let message = OutboundMessage::Forward(envelope.clone());
        for target in &targets {
            self.send(core, *target, &message);
            if let Some(seq) = core.registry.begin_command(*target) {
                self.schedule_role_reset(*target, seq);
            }
        }

        tracing::debug!(kind = %message.kind(), policy = %policy, targets = targets.len(), "Command dispatched");
        core.publish();
        Disposition::Dispatched {
            targets: targets.len(),
        }
    }

    fn relay(&self, core: &mut Core, id: ConnectionId, envelope: &Envelope, forward_as: &str) -> Disposition {
        if !core.registry.is_worker(id) {
            tracing::debug!(conn = %id, kind = %envelope.kind, "Result from a connection that is not a worker");
            return Disposition::Ignored(IgnoreReason::NotAWorker);
        }

        let identity = core.registry.identity(id).unwrap_or_default().to_string();
        let message = OutboundMessage::Forward(envelope.relay_as(forward_as, &identity));
        let report = publisher::fan_out(&core.registry, &message);

        if core.registry.role(id) == Some(WorkerRole::ExecutingCommand) {
            core.registry.set_role(id, WorkerRole::Idle);
        }

        core.publish();
        Disposition::Relayed {
            observers: report.delivered,
        }
    }

    fn send(&self, core: &Core, id: ConnectionId, message: &OutboundMessage) {
        match core.registry.send(id, message) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(conn = %id, kind = %message.kind(), "Connection closed before send"),
            Err(e) => error::log_dropped(id, &e, "Failed to encode message"),
        }
    }

    /// Reset a worker to idle after the configured delay
    ///
    /// Refers to the worker by id; if it disconnected, already reported a
    /// result, or was given a newer command, nothing happens.
    fn schedule_role_reset(&self, id: ConnectionId, seq: u64) {
        let core = Arc::clone(&self.core);
        let delay = self.settings.role_reset_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut core = core.lock().await;
            if core.registry.finish_command(id, seq) {
                tracing::debug!(conn = %id, "Command role reset to idle");
                core.publish();
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
