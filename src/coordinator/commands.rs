//! Command table: which observer commands go to which workers, and which
//! worker results are relayed back to observers
//!
//! The table is plain data so new command kinds can be added from a TOML
//! file without touching the router.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::protocol;

// ============================================================================
// Selection Policy
// ============================================================================

/// How target workers are picked for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Every registered worker
    All,

    /// One worker, uniformly at random
    Random,

    /// The longest-connected worker
    Fixed,
}

impl SelectionPolicy {
    /// Pick targets from `workers` (given in admission order)
    ///
    /// An empty worker list always yields no targets.
    pub fn select<T: Copy, R: Rng + ?Sized>(&self, workers: &[T], rng: &mut R) -> Vec<T> {
        match self {
            Self::All => workers.to_vec(),
            Self::Random => workers.choose(rng).copied().into_iter().collect(),
            Self::Fixed => workers.first().copied().into_iter().collect(),
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Random => "random",
            Self::Fixed => "fixed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Table Entries
// ============================================================================

/// An observer command routed to workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRoute {
    pub kind: String,
    pub select: SelectionPolicy,
}

/// A worker result relayed to observers under another kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRoute {
    pub kind: String,
    pub forward_as: String,
}

/// On-disk layout of a command table file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandTableFile {
    #[serde(default)]
    pub commands: Vec<CommandRoute>,

    #[serde(default)]
    pub relays: Vec<RelayRoute>,
}

// ============================================================================
// Command Table
// ============================================================================

/// Kind-to-route lookup used by the router
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, SelectionPolicy>,
    relays: HashMap<String, String>,
}

impl CommandTable {
    /// An empty table: only the built-in registration and completion kinds work
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table (hash, shell and file commands)
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.commands.insert("HASH_JOB".into(), SelectionPolicy::Random);
        table.commands.insert("SHELL_JOB".into(), SelectionPolicy::All);
        table.commands.insert("READ_FILE".into(), SelectionPolicy::Fixed);
        table.relays.insert("HASH_RESULT".into(), "HASH_OUTPUT".into());
        table.relays.insert("SHELL_RESULT".into(), "SHELL_OUTPUT".into());
        table.relays.insert("FILE_CONTENT".into(), "FILE_OUTPUT".into());
        table
    }

    /// Add or replace a command route
    pub fn with_command(mut self, kind: impl Into<String>, select: SelectionPolicy) -> Result<Self, CommandTableError> {
        let kind = kind.into();
        self.check_kind(&kind)?;
        if self.relays.contains_key(&kind) {
            return Err(CommandTableError::KindConflict(kind));
        }
        self.commands.insert(kind, select);
        Ok(self)
    }

    /// Add or replace a relay route
    pub fn with_relay(mut self, kind: impl Into<String>, forward_as: impl Into<String>) -> Result<Self, CommandTableError> {
        let kind = kind.into();
        let forward_as = forward_as.into();
        self.check_kind(&kind)?;
        self.check_kind(&forward_as)?;
        if self.commands.contains_key(&kind) {
            return Err(CommandTableError::KindConflict(kind));
        }
        self.relays.insert(kind, forward_as);
        Ok(self)
    }

    /// Merge routes from a parsed file over this table
    pub fn merge(mut self, file: CommandTableFile) -> Result<Self, CommandTableError> {
        let mut seen = std::collections::HashSet::new();
        for kind in file
            .commands
            .iter()
            .map(|c| &c.kind)
            .chain(file.relays.iter().map(|r| &r.kind))
        {
            if !seen.insert(kind.clone()) {
                return Err(CommandTableError::DuplicateKind(kind.clone()));
            }
        }

        // File entries override built-in ones of the same kind, even across
        // the command/relay boundary
        for route in &file.commands {
            self.relays.remove(&route.kind);
        }
        for route in &file.relays {
            self.commands.remove(&route.kind);
        }

        for route in file.commands {
            self = self.with_command(route.kind, route.select)?;
        }
        for route in file.relays {
            self = self.with_relay(route.kind, route.forward_as)?;
        }
        Ok(self)
    }

    /// Parse a TOML document and merge it over the built-in table
    pub fn from_toml_str(content: &str) -> Result<Self, CommandTableError> {
        let file: CommandTableFile =
            toml::from_str(content).map_err(|e| CommandTableError::Parse(e.to_string()))?;
        Self::builtin().merge(file)
    }

    /// Load a TOML file and merge it over the built-in table
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CommandTableError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CommandTableError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn command(&self, kind: &str) -> Option<SelectionPolicy> {
        self.commands.get(kind).copied()
    }

    pub fn relay(&self, kind: &str) -> Option<&str> {
        self.relays.get(kind).map(String::as_str)
    }

    /// Command routes sorted by kind
    pub fn commands(&self) -> Vec<CommandRoute> {
        let mut routes: Vec<_> = self
            .commands
            .iter()
            .map(|(kind, select)| CommandRoute {
                kind: kind.clone(),
                select: *select,
            })
            .collect();
        routes.sort_by(|a, b| a.kind.cmp(&b.kind));
        routes
    }

    /// Relay routes sorted by kind
    pub fn relays(&self) -> Vec<RelayRoute> {
        let mut routes: Vec<_> = self
            .relays
            .iter()
            .map(|(kind, forward_as)| RelayRoute {
                kind: kind.clone(),
                forward_as: forward_as.clone(),
            })
            .collect();
        routes.sort_by(|a, b| a.kind.cmp(&b.kind));
        routes
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut out = String::from("Commands (observer -> workers)\n");
        for route in self.commands() {
            out.push_str(&format!("  {:<16} {}\n", route.kind, route.select));
        }
        out.push_str("Relays (worker -> observers)\n");
        for route in self.relays() {
            out.push_str(&format!("  {:<16} -> {}\n", route.kind, route.forward_as));
        }
        out
    }

    fn check_kind(&self, kind: &str) -> Result<(), CommandTableError> {
        if kind.trim().is_empty() {
            return Err(CommandTableError::EmptyKind);
        }
        if protocol::is_reserved(kind) {
            return Err(CommandTableError::ReservedKind(kind.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandTableError {
    #[error("Command kind must not be empty")]
    EmptyKind,

    #[error("Kind '{0}' is reserved by the coordinator")]
    ReservedKind(String),

    #[error("Kind '{0}' is declared more than once")]
    DuplicateKind(String),

    #[error("Kind '{0}' is used as both a command and a relay")]
    KindConflict(String),

    #[error("Invalid command table: {0}")]
    Parse(String),

    #[error("Failed to read command table '{path}': {reason}")]
    Io { path: String, reason: String },
}

// ============================================================================
// Tests
// ============================================================================
