//! Cascading cancellation tests.

use fedflow::core::{AssetKind, PlanStatus, TaskStatus};
use fedflow::events::{Event, EventFilter, EventKind};
use fedflow::orchestration::TaskActionKind;
use fedflow::state::EntityStore;

use crate::fixtures::{fail_with_logs, new_task, plan_key, task_key, Harness, OWNER, WORKER};

fn cascade_events(events: &[Event], after: u64) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| e.ordering_key > after && e.metadata.contains_key("canceled_by"))
        .collect()
}

/// Canceling the head of a chain of N dependents cancels all N and emits
/// exactly N cascade events in key order.
#[test]
fn test_chain_cascade_cancels_every_dependent() {
    const N: u128 = 8;
    let mut h = Harness::with_plan();
    let mut tasks = vec![new_task(0, &[])];
    for n in 1..=N {
        tasks.push(new_task(n, &[n - 1]));
    }
    h.register(tasks).unwrap();

    let before = h.last_ordering_key();
    h.act(OWNER, 0, TaskActionKind::Cancel).unwrap();

    for n in 0..=N {
        assert_eq!(h.status(n), TaskStatus::Canceled, "task {}", n);
    }
    let events = h.events();
    let cascaded = cascade_events(&events, before);
    assert_eq!(cascaded.len(), N as usize);
    let keys: Vec<String> = cascaded.iter().map(|e| e.asset_key.clone()).collect();
    let expected: Vec<String> = (1..=N).map(|n| task_key(n).to_string()).collect();
    assert_eq!(keys, expected);
    assert!(cascaded
        .iter()
        .all(|e| e.metadata.get("canceled_by") == Some(&task_key(0).to_string())));
}

#[test]
fn test_failure_cascades_depth_first_in_key_order() {
    // 1 ─┬─► 2 ──► 4
    //    └─► 3 ──► 5
    let mut h = Harness::with_plan();
    h.register(vec![
        new_task(1, &[]),
        new_task(2, &[1]),
        new_task(3, &[1]),
        new_task(4, &[2]),
        new_task(5, &[3]),
    ])
    .unwrap();
    h.act(WORKER, 1, TaskActionKind::Start).unwrap();

    let before = h.last_ordering_key();
    h.act(WORKER, 1, fail_with_logs()).unwrap();

    let events = h.events();
    let order: Vec<String> = cascade_events(&events, before)
        .iter()
        .map(|e| e.asset_key.clone())
        .collect();
    let expected: Vec<String> = [2, 4, 3, 5].iter().map(|n| task_key(*n).to_string()).collect();
    assert_eq!(order, expected);
    assert_eq!(h.status(1), TaskStatus::Failed);
    assert_eq!(
        h.orchestrator.get_compute_plan(&plan_key(1)).unwrap().status,
        PlanStatus::Failed
    );
}

#[test]
fn test_cascade_emits_one_event_per_task_in_diamond() {
    let mut h = Harness::with_plan();
    h.register(vec![
        new_task(1, &[]),
        new_task(2, &[1]),
        new_task(3, &[1]),
        new_task(4, &[2, 3]),
    ])
    .unwrap();

    let before = h.last_ordering_key();
    h.act(OWNER, 1, TaskActionKind::Cancel).unwrap();
    let events = h.events();
    assert_eq!(cascade_events(&events, before).len(), 3);
}

#[test]
fn test_cascade_stops_at_terminal_tasks() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[]), new_task(2, &[1]), new_task(3, &[2])]).unwrap();
    h.complete(1, 1).unwrap();
    h.complete(2, 2).unwrap();
    assert_eq!(h.status(3), TaskStatus::Todo);

    let before = h.last_ordering_key();
    h.act(OWNER, 3, TaskActionKind::Cancel).unwrap();
    assert_eq!(h.status(1), TaskStatus::Done);
    assert_eq!(h.status(2), TaskStatus::Done);
    let events = h.events();
    assert!(cascade_events(&events, before).is_empty());
}

#[test]
fn test_canceled_leftovers_leave_plan_open() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[]), new_task(2, &[])]).unwrap();
    h.complete(1, 1).unwrap();
    h.act(OWNER, 2, TaskActionKind::Cancel).unwrap();

    let plan = h.orchestrator.get_compute_plan(&plan_key(1)).unwrap();
    assert_eq!(plan.status, PlanStatus::Waiting);
    assert!(!plan.is_canceled());
    assert!(!h.orchestrator.is_plan_running(&plan_key(1)).unwrap());

    let updates = h.events_matching(&EventFilter {
        asset_kind: Some(AssetKind::ComputePlan),
        event_kind: Some(EventKind::Updated),
        ..Default::default()
    });
    assert_eq!(
        updates.last().and_then(|e| e.metadata.get("status")).map(String::as_str),
        Some("waiting")
    );

    // Without an explicit cancel the plan still takes new work.
    let registered = h.register(vec![new_task(3, &[1])]).unwrap();
    assert_eq!(registered[0].status, TaskStatus::Todo);
    assert_eq!(
        h.orchestrator.get_compute_plan(&plan_key(1)).unwrap().status,
        PlanStatus::Todo
    );
}

#[test]
fn test_stored_counts_track_cascades() {
    let mut h = Harness::with_plan();
    h.register(vec![
        new_task(1, &[]),
        new_task(2, &[1]),
        new_task(3, &[1]),
        new_task(4, &[2, 3]),
        new_task(5, &[]),
        new_task(6, &[5]),
    ])
    .unwrap();
    let store_counts = |h: &Harness| {
        let store = h.orchestrator.store();
        (
            store.plan_task_counts(&plan_key(1)).unwrap(),
            store.recount_plan_tasks(&plan_key(1)).unwrap(),
        )
    };

    h.complete(1, 1).unwrap();
    h.act(WORKER, 2, TaskActionKind::Start).unwrap();
    h.act(WORKER, 2, fail_with_logs()).unwrap();
    let (stored, recounted) = store_counts(&h);
    assert_eq!(stored, recounted);
    assert_eq!((stored.done, stored.failed, stored.canceled), (1, 1, 1));

    h.act(OWNER, 5, TaskActionKind::Cancel).unwrap();
    let (stored, recounted) = store_counts(&h);
    assert_eq!(stored, recounted);
    assert_eq!(stored.total(), 6);
    assert_eq!(stored.active(), 1);
}
