//! Atomicity and deterministic replay, including the file store.

use serde_json::json;
use tempfile::TempDir;

use fedflow::core::{PlanStatus, TaskStatus};
use fedflow::events::{Event, EventFilter};
use fedflow::orchestration::TaskActionKind;
use fedflow::pagination::Pagination;
use fedflow::store::file::FileStore;
use fedflow::store::memory::MemoryStore;
use fedflow::store::KvStore;
use fedflow::{ErrorKind, Orchestrator, Transaction};

use crate::fixtures::{
    model_key, new_task, plan_key, task_key, Harness, OUTSIDER, OWNER, WORKER,
};

/// The transaction file a client would hand to `fedflow submit`.
fn transaction_file() -> String {
    let public_model = json!({ "model": { "permissions": { "process": { "public": true } } } });
    json!([
        {
            "tx_id": "tx-1",
            "timestamp": "2023-11-14T22:13:20Z",
            "principal": OWNER,
            "request": { "type": "register_plan", "key": plan_key(1).to_string(), "name": "replay" }
        },
        {
            "tx_id": "tx-2",
            "timestamp": "2023-11-14T22:14:20Z",
            "principal": OWNER,
            "request": {
                "type": "register_tasks",
                "tasks": [
                    {
                        "key": task_key(2).to_string(),
                        "plan_key": plan_key(1).to_string(),
                        "worker": WORKER,
                        "parent_task_keys": [task_key(1).to_string()],
                        "inputs": {
                            "parent": {
                                "kind": "parent_output",
                                "parent_task_key": task_key(1).to_string(),
                                "output_identifier": "model"
                            }
                        },
                        "outputs": public_model.clone()
                    },
                    {
                        "key": task_key(1).to_string(),
                        "plan_key": plan_key(1).to_string(),
                        "worker": WORKER,
                        "outputs": public_model
                    }
                ]
            }
        },
        {
            "tx_id": "tx-3",
            "timestamp": "2023-11-14T22:15:20Z",
            "principal": WORKER,
            "request": {
                "type": "apply_task_action",
                "task_key": task_key(1).to_string(),
                "action": { "kind": "start" }
            }
        },
        {
            "tx_id": "tx-4",
            "timestamp": "2023-11-14T22:16:20Z",
            "principal": WORKER,
            "request": {
                "type": "apply_task_action",
                "task_key": task_key(1).to_string(),
                "action": {
                    "kind": "done",
                    "models": [{
                        "key": model_key(1).to_string(),
                        "output_identifier": "model",
                        "address": { "storage_address": "s3://models/1", "checksum": "beef" }
                    }]
                }
            }
        },
        {
            "tx_id": "tx-5",
            "timestamp": "2023-11-14T22:17:20Z",
            "principal": OWNER,
            "request": { "type": "apply_plan_action", "plan_key": plan_key(1).to_string(), "action": "cancel" }
        }
    ])
    .to_string()
}

fn transactions() -> Vec<Transaction> {
    serde_json::from_str(&transaction_file()).unwrap()
}

fn all_events<S: KvStore>(orchestrator: &Orchestrator<S>) -> Vec<Event> {
    let mut out = Vec::new();
    let mut pagination = Pagination::first(0);
    loop {
        let page = orchestrator
            .query_events(&EventFilter::default(), &pagination)
            .unwrap();
        out.extend(page.items);
        match page.next_page_token {
            Some(token) => pagination = Pagination::after(0, &token),
            None => return out,
        }
    }
}

#[test]
fn test_failed_action_leaves_store_untouched() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[]), new_task(2, &[1])]).unwrap();
    h.act(WORKER, 1, TaskActionKind::Start).unwrap();
    let before = h.orchestrator.store().clone();

    // Done without the model for the declared output.
    let err = h
        .act(WORKER, 1, TaskActionKind::Done { models: vec![] })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.orchestrator.store(), &before);

    let err = h
        .register(vec![new_task(3, &[]), new_task(4, &[77])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.orchestrator.store(), &before);

    assert_eq!(h.status(1), TaskStatus::Doing);
    assert_eq!(h.status(2), TaskStatus::Waiting);
}

#[test]
fn test_rejections_do_not_consume_ordering_keys() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[])]).unwrap();
    let last = h.last_ordering_key();

    assert!(h.act(OUTSIDER, 1, TaskActionKind::Start).is_err());
    assert_eq!(h.last_ordering_key(), last);

    h.act(WORKER, 1, TaskActionKind::Start).unwrap();
    let next = h.events().into_iter().find(|e| e.ordering_key > last);
    assert_eq!(next.map(|e| e.ordering_key), Some(last + 1));
}

#[test]
fn test_replay_from_transaction_file_is_identical() {
    let mut first = Orchestrator::new(MemoryStore::new());
    let mut second = Orchestrator::new(MemoryStore::new());
    for tx in transactions() {
        let a = first.submit(&tx).unwrap();
        let b = second.submit(&tx).unwrap();
        assert_eq!(a, b, "{}", tx.tx_id);
    }
    assert_eq!(first.store(), second.store());

    let plan = first.get_compute_plan(&plan_key(1)).unwrap();
    assert_eq!(plan.status, PlanStatus::Canceled);
    assert_eq!(
        first.get_compute_task(&task_key(1)).unwrap().status,
        TaskStatus::Done
    );
    assert_eq!(
        first.get_compute_task(&task_key(2)).unwrap().status,
        TaskStatus::Canceled
    );

    let events = all_events(&first);
    assert!(events.iter().all(|e| e.tx_id.starts_with("tx-")));
    assert_eq!(events, all_events(&second));
}

#[test]
fn test_rejected_transaction_replays_identically() {
    let mut txs = transactions();
    let mut rejected = txs[2].clone();
    rejected.tx_id = "tx-3b".to_string();
    rejected.principal = OUTSIDER.to_string();
    txs.insert(3, rejected);

    let mut first = Orchestrator::new(MemoryStore::new());
    let mut second = Orchestrator::new(MemoryStore::new());
    for tx in &txs {
        let a = first.submit(tx).map_err(|e| e.kind());
        let b = second.submit(tx).map_err(|e| e.kind());
        assert_eq!(a, b);
    }
    assert_eq!(first.store(), second.store());
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger").join("store.json");

    let mut reference = Orchestrator::new(MemoryStore::new());
    {
        let mut orchestrator = Orchestrator::new(FileStore::open(&path).unwrap());
        for tx in transactions() {
            orchestrator.submit(&tx).unwrap();
            reference.submit(&tx).unwrap();
            orchestrator.store_mut().flush().unwrap();
        }
        assert!(!orchestrator.store().is_dirty());
    }

    let mut reopened = Orchestrator::new(FileStore::open(&path).unwrap());
    let events = all_events(&reopened);
    assert_eq!(events, all_events(&reference));
    assert_eq!(
        reopened.get_compute_plan(&plan_key(1)).unwrap().status,
        PlanStatus::Canceled
    );

    let last = events.last().map(|e| e.ordering_key).unwrap();
    let mut next = transactions()[0].clone();
    next.tx_id = "tx-6".to_string();
    if let fedflow::orchestration::Request::RegisterPlan(plan) = &mut next.request {
        plan.key = plan_key(2);
    }
    reopened.submit(&next).unwrap();
    let events = all_events(&reopened);
    assert_eq!(events.last().map(|e| e.ordering_key), Some(last + 1));
}
