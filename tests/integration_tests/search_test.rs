//! Search scenarios: range assignment, completion and solutions

use scavenger::coordinator::{Disposition, Membership, Range, WorkerRole};

use super::fixtures::{self, RANGE_SIZE};

// ============================================================================
// Range Assignment
// ============================================================================

#[tokio::test]
async fn test_worker_is_kept_busy_until_solution() {
    let router = fixtures::router();
    let mut w = fixtures::worker(&router).await;

    let first = w.drain();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["type"], "NEW_RANGE");
    assert_eq!(first[0]["start"], 0);
    assert_eq!(first[0]["end"], 100_000);

    let result = router.handle_text(w.id, r#"{"type":"JOB_COMPLETE"}"#).await;
    assert_eq!(
        result,
        vec![Disposition::RangeAssigned(Range {
            start: 100_000,
            end: 200_000
        })]
    );
    let second = w.drain();
    assert_eq!(second[0]["start"], 100_000);
    assert_eq!(second[0]["end"], 200_000);

    let result = router
        .handle_text(w.id, r#"{"type":"JOB_COMPLETE","solution":"42"}"#)
        .await;
    assert_eq!(result, vec![Disposition::Halted]);
    assert!(router.is_solved().await);

    let stop = w.drain();
    assert_eq!(stop.len(), 1);
    assert_eq!(stop[0]["type"], "STOP");
    assert_eq!(stop[0]["solution"], "42");
    assert_eq!(router.role(w.id).await, Some(WorkerRole::Idle));

    // A worker joining after the solution gets a halt, not a range
    let mut late = fixtures::worker(&router).await;
    let messages = late.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "STOP");
    assert_eq!(messages[0]["solution"], "42");

    let stats = router.snapshot().await;
    assert_eq!(stats.total_units, 2 * RANGE_SIZE);
    assert_eq!(stats.cursor, 2 * RANGE_SIZE);
}

#[tokio::test]
async fn test_concurrent_workers_get_disjoint_ranges() {
    let router = fixtures::router();
    let mut workers = Vec::new();
    for _ in 0..5 {
        workers.push(fixtures::worker(&router).await);
    }

    let mut ranges: Vec<(u64, u64)> = workers
        .iter_mut()
        .map(|w| {
            let messages = w.drain();
            (
                messages[0]["start"].as_u64().unwrap(),
                messages[0]["end"].as_u64().unwrap(),
            )
        })
        .collect();
    ranges.sort();

    for pair in ranges.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    assert_eq!(ranges.last().unwrap().1, 5 * RANGE_SIZE);
}

#[tokio::test]
async fn test_abandoned_range_is_never_reassigned() {
    let router = fixtures::router();
    let mut quitter = fixtures::worker(&router).await;
    let abandoned = quitter.drain()[0]["start"].as_u64().unwrap();

    router.disconnect(quitter.id).await;
    assert_eq!(router.membership(quitter.id).await, None);

    let mut next = fixtures::worker(&router).await;
    let assigned = next.drain()[0]["start"].as_u64().unwrap();

    assert_eq!(abandoned, 0);
    assert_eq!(assigned, RANGE_SIZE);
    assert_eq!(router.snapshot().await.cursor, 2 * RANGE_SIZE);
}

#[tokio::test]
async fn test_conflicting_solution_is_dropped() {
    let router = fixtures::router();
    let a = fixtures::worker(&router).await;
    let b = fixtures::worker(&router).await;

    router
        .handle_text(a.id, r#"{"type":"JOB_COMPLETE","solution":"42"}"#)
        .await;
    router
        .handle_text(b.id, r#"{"type":"JOB_COMPLETE","solution":"7"}"#)
        .await;

    let stats = router.snapshot().await;
    assert_eq!(stats.solution.as_deref(), Some("42"));
    assert_eq!(stats.total_units, 2 * RANGE_SIZE);
}

#[tokio::test]
async fn test_duplicate_completions_count_at_face_value() {
    let router = fixtures::router();
    let w = fixtures::worker(&router).await;

    for _ in 0..3 {
        router.handle_text(w.id, r#"{"type":"JOB_COMPLETE"}"#).await;
    }

    let stats = router.snapshot().await;
    assert_eq!(stats.total_units, 3 * RANGE_SIZE);
    assert_eq!(stats.workers[0].ranges_completed, 3);
}

// ============================================================================
// Observers and Stats
// ============================================================================

#[tokio::test]
async fn test_observer_first_message_lists_workers() {
    let router = fixtures::router();
    let w1 = fixtures::worker(&router).await;
    let w2 = fixtures::worker(&router).await;

    let mut o = fixtures::observer(&router).await;
    let messages = o.drain();

    assert!(!messages.is_empty());
    let first = &messages[0];
    assert_eq!(first["type"], "STATS");
    assert_eq!(first["observers"], 1);

    let workers = first["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0]["id"], w1.identity.as_str());
    assert_eq!(workers[1]["id"], w2.identity.as_str());
    assert_eq!(workers[0]["role"], "ASSIGNED_RANGE");
}

#[tokio::test]
async fn test_every_state_change_is_published() {
    let router = fixtures::router();
    let mut o = fixtures::observer(&router).await;
    o.drain();

    let w = fixtures::worker(&router).await;
    assert_eq!(o.drain_kind("STATS").len(), 1);

    router.handle_text(w.id, r#"{"type":"JOB_COMPLETE"}"#).await;
    let stats = o.drain_kind("STATS");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["totalUnits"], RANGE_SIZE);

    router.disconnect(w.id).await;
    let stats = o.drain_kind("STATS");
    assert_eq!(stats.len(), 1);
    assert!(stats[0]["workers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_observer_does_not_block_others() {
    let router = fixtures::router();
    let mut dead = fixtures::observer(&router).await;
    let mut alive = fixtures::observer(&router).await;
    dead.close();
    alive.drain();

    fixtures::worker(&router).await;

    assert_eq!(alive.drain_kind("STATS").len(), 1);
}

#[tokio::test]
async fn test_switching_roles_is_exclusive() {
    let router = fixtures::router();
    let peer = fixtures::worker(&router).await;
    assert_eq!(router.membership(peer.id).await, Some(Membership::Worker));

    router.handle_text(peer.id, r#"{"type":"REGISTER_OBSERVER"}"#).await;
    assert_eq!(router.membership(peer.id).await, Some(Membership::Observer));
    assert_eq!(router.role(peer.id).await, None);

    let stats = router.snapshot().await;
    assert!(stats.workers.is_empty());
    assert_eq!(stats.observers, 1);

    router.handle_text(peer.id, r#"{"type":"REGISTER_WORKER"}"#).await;
    let stats = router.snapshot().await;
    assert_eq!(stats.workers.len(), 1);
    assert_eq!(stats.observers, 0);
}
