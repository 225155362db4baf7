//! Decoded parameter structs, one per exposed operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{
    Addressable, FailedAssetKind, ModelKey, Permission, PlanKey, PlanStatus, SampleKey,
    TaskAction, TaskInput, TaskKey, TaskOutput, TaskStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComputePlan {
    pub key: PlanKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanActionParam {
    pub plan_key: PlanKey,
    pub action: PlanAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComputeTask {
    pub key: TaskKey,
    pub plan_key: PlanKey,
    pub worker: String,
    #[serde(default)]
    pub parent_task_keys: Vec<TaskKey>,
    #[serde(default)]
    pub inputs: BTreeMap<String, TaskInput>,
    /// The `disabled` flag of a new output is ignored.
    #[serde(default)]
    pub outputs: BTreeMap<String, TaskOutput>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A batch of tasks of a single plan, registered all or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTasksParam {
    pub tasks: Vec<NewComputeTask>,
}

/// A model produced for one declared output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModel {
    pub key: ModelKey,
    pub output_identifier: String,
    pub address: Addressable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFailureReport {
    pub logs_address: Addressable,
    #[serde(default)]
    pub asset_type: FailedAssetKind,
}

/// Task action with the payload it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskActionKind {
    Start,
    Done { models: Vec<NewModel> },
    Fail { failure_report: NewFailureReport },
    Cancel,
}

impl TaskActionKind {
    pub fn action(&self) -> TaskAction {
        match self {
            TaskActionKind::Start => TaskAction::Start,
            TaskActionKind::Done { .. } => TaskAction::Done,
            TaskActionKind::Fail { .. } => TaskAction::Fail,
            TaskActionKind::Cancel => TaskAction::Cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskActionParam {
    pub task_key: TaskKey,
    pub action: TaskActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableOutputParam {
    pub task_key: TaskKey,
    pub output_identifier: String,
}

fn public_permission() -> Permission {
    Permission::public()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDataSample {
    pub key: SampleKey,
    pub address: Addressable,
    #[serde(default = "public_permission")]
    pub process: Permission,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDataSamplesParam {
    pub samples: Vec<NewDataSample>,
}

// Query filters. Unset fields match everything.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFilter {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub plan_key: Option<PlanKey>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFilter {
    #[serde(default)]
    pub compute_task_key: Option<TaskKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFilter {
    #[serde(default)]
    pub owner: Option<String>,
}
