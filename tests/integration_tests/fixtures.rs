//! Shared helpers for coordinator integration tests

use std::time::Duration;

use scavenger::coordinator::{
    CommandRouter, CommandTable, ConnectionId, CoordinatorConfig, JobKind, RouterSettings,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub const RANGE_SIZE: u64 = 100_000;
pub const ROLE_RESET: Duration = Duration::from_secs(5);

/// One simulated connection: its id plus the receiving end of its outbox
pub struct Peer {
    pub id: ConnectionId,
    pub identity: String,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    /// All messages queued so far, decoded
    pub fn drain(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            out.push(serde_json::from_str(&text).expect("outbound message is JSON"));
        }
        out
    }

    /// Messages of one kind, dropping everything else
    pub fn drain_kind(&mut self, kind: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    /// Close the receiving side, as a dead socket would
    pub fn close(&mut self) {
        self.rx.close();
    }
}

pub fn router() -> CommandRouter {
    CommandRouter::new(
        RouterSettings {
            range_size: RANGE_SIZE,
            target: "00000".to_string(),
            job_kind: JobKind::NewRange,
            role_reset_delay: ROLE_RESET,
        },
        CommandTable::builtin(),
    )
}

pub fn config() -> CoordinatorConfig {
    CoordinatorConfig::builder()
        .shared_secret("correct-horse")
        .bind_address_str("127.0.0.1:0")
        .expect("valid address")
        .enable_request_logging(false)
        .build()
        .expect("valid config")
}

pub async fn connect(router: &CommandRouter) -> Peer {
    let (tx, rx) = mpsc::unbounded_channel();
    let (id, identity) = router.connect("127.0.0.1:40000", tx).await;
    Peer { id, identity, rx }
}

pub async fn worker(router: &CommandRouter) -> Peer {
    let peer = connect(router).await;
    router.handle_text(peer.id, r#"{"type":"REGISTER_WORKER"}"#).await;
    peer
}

pub async fn observer(router: &CommandRouter) -> Peer {
    let peer = connect(router).await;
    router.handle_text(peer.id, r#"{"type":"REGISTER_OBSERVER"}"#).await;
    peer
}
