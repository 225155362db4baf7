//! Output disablement and input resolution.

use fedflow::core::{AssetKind, ComputeTask, Permission, TaskInput};
use fedflow::events::{EventFilter, EventKind};
use fedflow::orchestration::DisableOutputParam;
use fedflow::{ErrorKind, Result};

use crate::fixtures::{
    model_key, new_sample, new_task, sample_key, task_key, Harness, OUTSIDER, OWNER, WORKER,
};

impl Harness {
    fn disable(&mut self, principal: &str, task: u128, output: &str) -> Result<ComputeTask> {
        let ctx = self.next_ctx();
        self.orchestrator.disable_output(
            &ctx,
            principal,
            DisableOutputParam {
                task_key: task_key(task),
                output_identifier: output.to_string(),
            },
        )
    }
}

#[test]
fn test_disable_twice_emits_events_once() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[])]).unwrap();
    h.complete(1, 1).unwrap();

    let task = h.disable(OWNER, 1, "model").unwrap();
    assert!(task.outputs["model"].disabled);
    assert!(h.orchestrator.get_model(&model_key(1)).unwrap().disabled);
    let after_first = h.events();

    let last = after_first.len();
    let tail: Vec<(AssetKind, EventKind)> = after_first[last - 2..]
        .iter()
        .map(|e| (e.asset_kind, e.event_kind))
        .collect();
    assert_eq!(
        tail,
        vec![
            (AssetKind::ComputeTask, EventKind::Updated),
            (AssetKind::Model, EventKind::Disabled),
        ]
    );

    h.disable(OWNER, 1, "model").unwrap();
    assert_eq!(h.events().len(), after_first.len());
    let disabled = h.events_matching(&EventFilter {
        event_kind: Some(EventKind::Disabled),
        ..Default::default()
    });
    assert_eq!(disabled.len(), 1);
}

#[test]
fn test_disable_requires_owner_or_permission() {
    let mut h = Harness::with_plan();
    let mut task = new_task(1, &[]);
    if let Some(output) = task.outputs.get_mut("model") {
        output.permissions.disable = Permission::restricted([WORKER]);
    }
    h.register(vec![task]).unwrap();
    h.complete(1, 1).unwrap();

    let err = h.disable(OUTSIDER, 1, "model").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(!h.orchestrator.get_model(&model_key(1)).unwrap().disabled);

    h.disable(WORKER, 1, "model").unwrap();
    assert!(h.orchestrator.get_model(&model_key(1)).unwrap().disabled);
}

#[test]
fn test_disable_needs_done_task_and_declared_output() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[])]).unwrap();

    let err = h.disable(OWNER, 1, "model").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    h.complete(1, 1).unwrap();
    let err = h.disable(OWNER, 1, "weights").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_disabled_output_blocks_consumers() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[]), new_task(2, &[1])]).unwrap();
    h.complete(1, 1).unwrap();

    let resolved = h.orchestrator.get_task_input_assets(&task_key(2)).unwrap();
    assert_eq!(resolved.len(), 1);

    h.disable(OWNER, 1, "model").unwrap();

    let err = h.orchestrator.get_task_input_assets(&task_key(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = h.register(vec![new_task(3, &[1])]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let mut by_model = new_task(4, &[]);
    by_model.inputs.insert(
        "init".to_string(),
        TaskInput::Model {
            model_key: model_key(1),
        },
    );
    let err = h.register(vec![by_model]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_input_assets_resolve_in_identifier_order() {
    let mut h = Harness::with_plan();
    h.register_samples(OWNER, vec![new_sample(1)]).unwrap();
    h.register(vec![new_task(1, &[])]).unwrap();
    h.complete(1, 1).unwrap();

    let mut task = new_task(2, &[1]);
    task.inputs.insert(
        "data".to_string(),
        TaskInput::DataSample {
            sample_key: sample_key(1),
        },
    );
    h.register(vec![task]).unwrap();

    let resolved = h.orchestrator.get_task_input_assets(&task_key(2)).unwrap();
    let summary: Vec<(&str, AssetKind, String)> = resolved
        .iter()
        .map(|r| (r.identifier.as_str(), r.asset_kind, r.asset_key.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("data", AssetKind::DataSample, sample_key(1).to_string()),
            ("parent-1", AssetKind::Model, model_key(1).to_string()),
        ]
    );
    assert_eq!(resolved[0].address.storage_address, "s3://data/1");
    assert_eq!(resolved[1].address.storage_address, "s3://models/1");
}

#[test]
fn test_inputs_of_waiting_task_do_not_resolve() {
    let mut h = Harness::with_plan();
    h.register(vec![new_task(1, &[]), new_task(2, &[1])]).unwrap();
    let err = h.orchestrator.get_task_input_assets(&task_key(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = h
        .orchestrator
        .get_task_input_assets(&task_key(99))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_restricted_output_limits_consumers() {
    let mut h = Harness::with_plan();
    let mut parent = new_task(1, &[]);
    if let Some(output) = parent.outputs.get_mut("model") {
        output.permissions.process = Permission::restricted([OWNER]);
    }
    h.register(vec![parent]).unwrap();

    let err = h.register(vec![new_task(2, &[1])]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let mut own = new_task(3, &[1]);
    own.worker = OWNER.to_string();
    h.register(vec![own]).unwrap();
}
