//! Command dispatch and result relay tests

use std::time::Duration;

use scavenger::coordinator::{Disposition, WorkerRole};
use tokio::time::sleep;

use super::fixtures::{self, ROLE_RESET};

// ============================================================================
// Fan-out Selection
// ============================================================================

#[tokio::test]
async fn test_broadcast_command_with_no_workers_is_silent() {
    let router = fixtures::router();
    let mut o = fixtures::observer(&router).await;
    o.drain();

    let result = router
        .handle_text(o.id, r#"{"type":"SHELL_JOB","cmd":"uptime"}"#)
        .await;

    assert_eq!(result, vec![Disposition::Dispatched { targets: 0 }]);
    assert!(o.drain().is_empty());
}

#[tokio::test]
async fn test_broadcast_command_reaches_every_worker() {
    let router = fixtures::router();
    let mut workers = vec![
        fixtures::worker(&router).await,
        fixtures::worker(&router).await,
        fixtures::worker(&router).await,
    ];
    let o = fixtures::observer(&router).await;

    let result = router
        .handle_text(o.id, r#"{"type":"SHELL_JOB","cmd":"uptime"}"#)
        .await;
    assert_eq!(result, vec![Disposition::Dispatched { targets: 3 }]);

    for w in workers.iter_mut() {
        let commands = w.drain_kind("SHELL_JOB");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["cmd"], "uptime");
        assert_eq!(router.role(w.id).await, Some(WorkerRole::ExecutingCommand));
    }
}

#[tokio::test]
async fn test_random_command_reaches_one_worker() {
    let router = fixtures::router();
    let mut workers = vec![
        fixtures::worker(&router).await,
        fixtures::worker(&router).await,
        fixtures::worker(&router).await,
    ];
    let o = fixtures::observer(&router).await;

    router
        .handle_text(o.id, r#"{"type":"HASH_JOB","input":"abc"}"#)
        .await;

    let received: usize = workers
        .iter_mut()
        .map(|w| w.drain_kind("HASH_JOB").len())
        .sum();
    assert_eq!(received, 1);
}

#[tokio::test]
async fn test_fixed_command_goes_to_oldest_worker() {
    let router = fixtures::router();
    let mut oldest = fixtures::worker(&router).await;
    let mut newer = fixtures::worker(&router).await;
    let o = fixtures::observer(&router).await;

    for _ in 0..3 {
        router
            .handle_text(o.id, r#"{"type":"READ_FILE","path":"/etc/hostname"}"#)
            .await;
    }

    assert_eq!(oldest.drain_kind("READ_FILE").len(), 3);
    assert!(newer.drain_kind("READ_FILE").is_empty());
}

#[tokio::test]
async fn test_dispatch_is_published_to_observers() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let mut o = fixtures::observer(&router).await;
    o.drain();

    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;

    let stats = o.drain_kind("STATS");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["workers"][0]["id"], w.identity.as_str());
    assert_eq!(stats[0]["workers"][0]["role"], "EXECUTING_COMMAND");
}

// ============================================================================
// Result Relay
// ============================================================================

#[tokio::test]
async fn test_result_is_relayed_to_observers() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let mut o1 = fixtures::observer(&router).await;
    let mut o2 = fixtures::observer(&router).await;

    router.handle_text(o1.id, r#"{"type":"HASH_JOB","input":"abc"}"#).await;
    let result = router
        .handle_text(w.id, r#"{"type":"HASH_RESULT","digest":"ba7816bf"}"#)
        .await;

    assert_eq!(result, vec![Disposition::Relayed { observers: 2 }]);
    for o in [&mut o1, &mut o2] {
        let relayed = o.drain_kind("HASH_OUTPUT");
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0]["worker"], w.identity.as_str());
        assert_eq!(relayed[0]["digest"], "ba7816bf");
    }

    // Result arrival resets the role right away
    assert_eq!(router.role(w.id).await, Some(WorkerRole::Idle));
}

#[tokio::test]
async fn test_relay_preserves_arrival_order() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let mut o = fixtures::observer(&router).await;

    for line in 0..5 {
        router
            .handle_text(w.id, &format!(r#"{{"type":"SHELL_RESULT","line":{}}}"#, line))
            .await;
    }

    let lines: Vec<u64> = o
        .drain_kind("SHELL_OUTPUT")
        .iter()
        .map(|m| m["line"].as_u64().unwrap())
        .collect();
    assert_eq!(lines, vec![0, 1, 2, 3, 4]);
}

// ============================================================================
// Delayed Role Reset
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_role_resets_after_delay() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let mut o = fixtures::observer(&router).await;

    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;
    assert_eq!(router.role(w.id).await, Some(WorkerRole::ExecutingCommand));
    o.drain();

    sleep(ROLE_RESET + Duration::from_millis(100)).await;

    assert_eq!(router.role(w.id).await, Some(WorkerRole::Idle));
    let stats = o.drain_kind("STATS");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["workers"][0]["role"], "IDLE");
}

#[tokio::test(start_paused = true)]
async fn test_role_reset_skips_disconnected_worker() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let o = fixtures::observer(&router).await;

    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;
    router.disconnect(w.id).await;

    sleep(ROLE_RESET * 2).await;

    assert_eq!(router.role(w.id).await, None);
    assert_eq!(router.membership(w.id).await, None);
    assert!(router.snapshot().await.workers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_newer_command_outlives_older_timer() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let o = fixtures::observer(&router).await;

    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;
    sleep(Duration::from_secs(3)).await;
    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;

    // First timer fires at 5s but the second command is still running
    sleep(Duration::from_secs(3)).await;
    assert_eq!(router.role(w.id).await, Some(WorkerRole::ExecutingCommand));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(router.role(w.id).await, Some(WorkerRole::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_completion_after_command_keeps_range_role() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;
    let o = fixtures::observer(&router).await;

    router.handle_text(o.id, r#"{"type":"HASH_JOB"}"#).await;
    router.handle_text(w.id, r#"{"type":"JOB_COMPLETE"}"#).await;
    assert_eq!(router.role(w.id).await, Some(WorkerRole::AssignedRange));

    // The pending reset must not clobber the range assignment
    sleep(ROLE_RESET * 2).await;
    assert_eq!(router.role(w.id).await, Some(WorkerRole::AssignedRange));
}
