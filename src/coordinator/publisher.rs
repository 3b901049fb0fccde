//! Stats publisher and observer fan-out
//!
//! Every send is independent: an observer whose channel is closed is
//! skipped and the loop carries on with the rest.

use super::allocator::RangeAllocator;
use super::protocol::{OutboundMessage, StatsSnapshot};
use super::registry::ConnectionRegistry;

/// Result of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub skipped: usize,
}

/// Build a snapshot of registry and allocator state
pub fn capture(registry: &ConnectionRegistry, allocator: &RangeAllocator) -> StatsSnapshot {
    let snapshot = registry.snapshot();

    StatsSnapshot {
        workers: snapshot.workers,
        observers: snapshot.observers,
        total_units: allocator.total_completed_units(),
        solution: allocator.solution().map(str::to_string),
        cursor: allocator.cursor(),
        timestamp: chrono::Utc::now(),
    }
}

/// Send one message to every observer
pub fn fan_out(registry: &ConnectionRegistry, message: &OutboundMessage) -> FanOutReport {
    let mut report = FanOutReport::default();

    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(kind = %message.kind(), error = %e, "Failed to encode observer message");
            return report;
        }
    };

    for (id, outbox) in registry.observer_outboxes() {
        if outbox.is_closed() {
            report.skipped += 1;
            tracing::debug!(conn = %id, "Skipping closed observer");
            continue;
        }

        match outbox.send(text.clone()) {
            Ok(()) => report.delivered += 1,
            Err(_) => {
                report.skipped += 1;
                tracing::debug!(conn = %id, "Observer went away during send");
            }
        }
    }

    report
}

/// Push a fresh STATS snapshot to every observer
pub fn publish(registry: &ConnectionRegistry, allocator: &RangeAllocator) -> FanOutReport {
    let message = OutboundMessage::Stats(capture(registry, allocator));
    let report = fan_out(registry, &message);

    if report.skipped > 0 {
        tracing::debug!(
            delivered = report.delivered,
            skipped = report.skipped,
            "Stats published with skipped observers"
        );
    }

    report
}
