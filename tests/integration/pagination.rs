//! Stable paged listings.

use std::collections::BTreeMap;

use fedflow::core::{AssetKind, PlanStatus, TaskKey, TaskStatus};
use fedflow::events::EventFilter;
use fedflow::orchestration::{PlanFilter, TaskFilter};
use fedflow::pagination::Pagination;
use fedflow::ErrorKind;

use crate::fixtures::{new_task, plan_key, task_key, Harness, OWNER};

fn harness_with_tasks(count: u128) -> Harness {
    let mut h = Harness::with_plan();
    h.register((1..=count).map(|n| new_task(n, &[])).collect())
        .unwrap();
    h
}

#[test]
fn test_three_pages_visit_each_task_once() {
    let h = harness_with_tasks(25);
    let filter = TaskFilter::default();

    let first = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::first(10))
        .unwrap();
    assert_eq!(first.items.len(), 10);
    let token = first.next_page_token.clone().unwrap();

    let second = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::after(10, &token))
        .unwrap();
    assert_eq!(second.items.len(), 10);
    let token = second.next_page_token.clone().unwrap();

    let third = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::after(10, &token))
        .unwrap();
    assert_eq!(third.items.len(), 5);
    assert!(third.is_last());

    let mut seen: BTreeMap<TaskKey, usize> = BTreeMap::new();
    for task in first.items.iter().chain(&second.items).chain(&third.items) {
        *seen.entry(task.key).or_default() += 1;
    }
    assert_eq!(seen.len(), 25);
    assert!(seen.values().all(|count| *count == 1));
}

#[test]
fn test_inserts_between_pages_do_not_shift_the_cursor() {
    let mut h = harness_with_tasks(25);
    let filter = TaskFilter::default();

    let first = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::first(10))
        .unwrap();
    let token = first.next_page_token.clone().unwrap();

    // One key sorting before the cursor, one after every existing key.
    h.register(vec![new_task(0, &[]), new_task(30, &[])]).unwrap();

    let mut keys: Vec<TaskKey> = first.items.iter().map(|t| t.key).collect();
    let mut pagination = Pagination::after(10, &token);
    loop {
        let page = h
            .orchestrator
            .query_compute_tasks(&filter, &pagination)
            .unwrap();
        keys.extend(page.items.iter().map(|t| t.key));
        match page.next_page_token {
            Some(token) => pagination = Pagination::after(10, &token),
            None => break,
        }
    }

    let mut expected: Vec<TaskKey> = (1..=25).map(task_key).collect();
    expected.push(task_key(30));
    assert_eq!(keys, expected);
}

#[test]
fn test_exact_multiple_has_no_trailing_token() {
    let h = harness_with_tasks(10);
    let page = h
        .orchestrator
        .query_compute_tasks(&TaskFilter::default(), &Pagination::first(5))
        .unwrap();
    let token = page.next_page_token.unwrap();
    let last = h
        .orchestrator
        .query_compute_tasks(&TaskFilter::default(), &Pagination::after(5, &token))
        .unwrap();
    assert_eq!(last.items.len(), 5);
    assert!(last.next_page_token.is_none());
}

#[test]
fn test_filtered_pages_skip_non_matching_tasks() {
    let mut h = harness_with_tasks(12);
    for n in [2, 5, 9] {
        h.act(OWNER, n, fedflow::orchestration::TaskActionKind::Cancel)
            .unwrap();
    }

    let filter = TaskFilter {
        plan_key: Some(plan_key(1)),
        status: Some(TaskStatus::Canceled),
        worker: None,
    };
    let first = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::first(2))
        .unwrap();
    assert_eq!(
        first.items.iter().map(|t| t.key).collect::<Vec<_>>(),
        vec![task_key(2), task_key(5)]
    );
    let token = first.next_page_token.unwrap();
    let second = h
        .orchestrator
        .query_compute_tasks(&filter, &Pagination::after(2, &token))
        .unwrap();
    assert_eq!(
        second.items.iter().map(|t| t.key).collect::<Vec<_>>(),
        vec![task_key(9)]
    );
    assert!(second.is_last());
}

#[test]
fn test_event_pages_follow_ordering_keys() {
    let h = harness_with_tasks(25);
    let filter = EventFilter {
        asset_kind: Some(AssetKind::ComputeTask),
        ..Default::default()
    };

    let mut ordering_keys = Vec::new();
    let mut pagination = Pagination::first(7);
    loop {
        let page = h.orchestrator.query_events(&filter, &pagination).unwrap();
        assert!(page.items.len() <= 7);
        ordering_keys.extend(page.items.iter().map(|e| e.ordering_key));
        match page.next_page_token {
            Some(token) => pagination = Pagination::after(7, &token),
            None => break,
        }
    }
    assert_eq!(ordering_keys.len(), 25);
    assert!(ordering_keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_asset_event_pages() {
    let mut h = harness_with_tasks(1);
    h.complete(1, 1).unwrap();
    let filter = EventFilter {
        asset_key: Some(task_key(1).to_string()),
        ..Default::default()
    };

    let first = h
        .orchestrator
        .query_events(&filter, &Pagination::first(2))
        .unwrap();
    assert_eq!(first.items.len(), 2);
    let token = first.next_page_token.unwrap();
    let rest = h
        .orchestrator
        .query_events(&filter, &Pagination::after(2, &token))
        .unwrap();
    // created, doing, done
    assert_eq!(rest.items.len(), 1);
    assert!(rest.items[0].ordering_key > first.items[1].ordering_key);
    assert!(rest.is_last());
}

#[test]
fn test_plan_listing_by_status() {
    let mut h = harness_with_tasks(1);
    h.register_plan(OWNER, 2).unwrap();
    h.register_plan(OWNER, 3).unwrap();
    h.act(OWNER, 1, fedflow::orchestration::TaskActionKind::Cancel)
        .unwrap();

    let page = h
        .orchestrator
        .query_compute_plans(
            &PlanFilter {
                owner: Some(OWNER.to_string()),
                status: Some(PlanStatus::Todo),
            },
            &Pagination::first(0),
        )
        .unwrap();
    assert_eq!(
        page.items.iter().map(|p| p.key).collect::<Vec<_>>(),
        vec![plan_key(2), plan_key(3)]
    );
}

#[test]
fn test_malformed_token_rejected() {
    let h = harness_with_tasks(3);
    let err = h
        .orchestrator
        .query_compute_tasks(&TaskFilter::default(), &Pagination::after(2, "%%%"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
