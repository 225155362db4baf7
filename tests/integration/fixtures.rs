//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Driving an orchestrator over an in-memory store
//! - Building plans, tasks, samples and action parameters
//! - Reading back events

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use fedflow::core::{
    Addressable, ComputePlan, ComputeTask, ModelCategory, ModelKey, Permissions, PlanKey,
    SampleKey, TaskInput, TaskKey, TaskOutput, TaskStatus,
};
use fedflow::events::{Event, EventFilter};
use fedflow::orchestration::{
    NewComputePlan, NewComputeTask, NewDataSample, NewFailureReport, NewModel,
    RegisterDataSamplesParam, RegisterTasksParam, TaskActionKind, TaskActionParam,
};
use fedflow::pagination::Pagination;
use fedflow::store::memory::MemoryStore;
use fedflow::{Orchestrator, Result, TxContext};

pub const OWNER: &str = "org-owner";
pub const WORKER: &str = "org-worker";
pub const OUTSIDER: &str = "org-outsider";

pub fn plan_key(n: u128) -> PlanKey {
    PlanKey(Uuid::from_u128(0xA000 + n))
}

/// Task keys sort in the same order as `n`.
pub fn task_key(n: u128) -> TaskKey {
    TaskKey(Uuid::from_u128(0xB000 + n))
}

pub fn model_key(n: u128) -> ModelKey {
    ModelKey(Uuid::from_u128(0xC000 + n))
}

pub fn sample_key(n: u128) -> SampleKey {
    SampleKey(Uuid::from_u128(0xD000 + n))
}

/// A task of plan 1 with one public `model` output, reading `model` from
/// every parent.
pub fn new_task(n: u128, parents: &[u128]) -> NewComputeTask {
    let mut inputs = BTreeMap::new();
    for parent in parents {
        inputs.insert(
            format!("parent-{}", parent),
            TaskInput::ParentOutput {
                parent_task_key: task_key(*parent),
                output_identifier: "model".to_string(),
            },
        );
    }
    NewComputeTask {
        key: task_key(n),
        plan_key: plan_key(1),
        worker: WORKER.to_string(),
        parent_task_keys: parents.iter().map(|p| task_key(*p)).collect(),
        inputs,
        outputs: BTreeMap::from([(
            "model".to_string(),
            TaskOutput::new(ModelCategory::Simple, Permissions::public()),
        )]),
        metadata: BTreeMap::new(),
    }
}

pub fn new_sample(n: u128) -> NewDataSample {
    NewDataSample {
        key: sample_key(n),
        address: Addressable::new(&format!("s3://data/{}", n), "cafe"),
        process: fedflow::core::Permission::public(),
        metadata: BTreeMap::new(),
    }
}

pub fn done_with_model(model: u128) -> TaskActionKind {
    TaskActionKind::Done {
        models: vec![NewModel {
            key: model_key(model),
            output_identifier: "model".to_string(),
            address: Addressable::new(&format!("s3://models/{}", model), "beef"),
        }],
    }
}

pub fn fail_with_logs() -> TaskActionKind {
    TaskActionKind::Fail {
        failure_report: NewFailureReport {
            logs_address: Addressable::new("s3://logs/failure", "dead"),
            asset_type: Default::default(),
        },
    }
}

/// Orchestrator over a memory store with a logical clock.
pub struct Harness {
    pub orchestrator: Orchestrator<MemoryStore>,
    tx: i64,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            orchestrator: Orchestrator::new(MemoryStore::new()),
            tx: 0,
        }
    }

    /// Harness with plan 1 registered by [`OWNER`].
    pub fn with_plan() -> Self {
        let mut harness = Self::new();
        harness.register_plan(OWNER, 1).unwrap();
        harness
    }

    pub fn next_ctx(&mut self) -> TxContext {
        self.tx += 1;
        TxContext::new(format!("tx-{:04}", self.tx), logical_time(self.tx))
    }

    pub fn register_plan(&mut self, principal: &str, n: u128) -> Result<ComputePlan> {
        let ctx = self.next_ctx();
        self.orchestrator.register_plan(
            &ctx,
            principal,
            NewComputePlan {
                key: plan_key(n),
                name: format!("plan-{}", n),
                tags: vec!["integration".to_string()],
                metadata: BTreeMap::new(),
            },
        )
    }

    pub fn register(&mut self, tasks: Vec<NewComputeTask>) -> Result<Vec<ComputeTask>> {
        let ctx = self.next_ctx();
        self.orchestrator
            .register_tasks(&ctx, OWNER, RegisterTasksParam { tasks })
    }

    pub fn register_samples(&mut self, principal: &str, samples: Vec<NewDataSample>) -> Result<()> {
        let ctx = self.next_ctx();
        self.orchestrator
            .register_data_samples(&ctx, principal, RegisterDataSamplesParam { samples })
            .map(|_| ())
    }

    pub fn act(&mut self, principal: &str, task: u128, action: TaskActionKind) -> Result<ComputeTask> {
        let ctx = self.next_ctx();
        self.orchestrator.apply_task_action(
            &ctx,
            principal,
            TaskActionParam {
                task_key: task_key(task),
                action,
            },
        )
    }

    /// Start then complete a task as the worker.
    pub fn complete(&mut self, task: u128, model: u128) -> Result<ComputeTask> {
        self.act(WORKER, task, TaskActionKind::Start)?;
        self.act(WORKER, task, done_with_model(model))
    }

    pub fn status(&self, task: u128) -> TaskStatus {
        self.orchestrator
            .get_compute_task(&task_key(task))
            .map(|t| t.status)
            .unwrap_or_else(|e| panic!("task {} unreadable: {}", task, e))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events_matching(&EventFilter::default())
    }

    pub fn events_matching(&self, filter: &EventFilter) -> Vec<Event> {
        let mut out = Vec::new();
        let mut pagination = Pagination::first(0);
        loop {
            let page = self
                .orchestrator
                .query_events(filter, &pagination)
                .unwrap();
            out.extend(page.items);
            match page.next_page_token {
                Some(token) => pagination = Pagination::after(0, &token),
                None => return out,
            }
        }
    }

    pub fn last_ordering_key(&self) -> u64 {
        fedflow::events::last_ordering_key(self.orchestrator.store()).unwrap()
    }
}

pub fn logical_time(tx: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + tx * 60, 0).unwrap()
}
