//! Compute task data model and its status lifecycle.
//!
//! Tasks are the units of work of a compute plan. Each task tracks its
//! status, the organization executing it, the parents whose outputs it
//! consumes and the outputs it declares.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::{ModelCategory, ModelKey, Permissions, SampleKey};
use super::plan::PlanKey;
use crate::error::{Error, Result};

asset_key!(
    /// Unique identifier of a compute task, immutable after registration.
    TaskKey
);

/// Task status in its lifecycle.
///
/// ```text
/// WAITING ──► TODO ──► DOING ──► DONE
///    │          │        │
///    │          │        └─────► FAILED
///    └──────────┴────────┴─────► CANCELED
/// ```
///
/// DONE, FAILED and CANCELED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Some parent is not DONE yet.
    Waiting,
    /// Every parent is DONE; the worker may start.
    Todo,
    /// The worker is executing the task.
    Doing,
    Done,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// WAITING, TODO or DOING.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `target` is reachable from this status in one step.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Waiting, TaskStatus::Todo)
                | (TaskStatus::Waiting, TaskStatus::Canceled)
                | (TaskStatus::Todo, TaskStatus::Doing)
                | (TaskStatus::Todo, TaskStatus::Canceled)
                | (TaskStatus::Doing, TaskStatus::Done)
                | (TaskStatus::Doing, TaskStatus::Failed)
                | (TaskStatus::Doing, TaskStatus::Canceled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Waiting => write!(f, "waiting"),
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::Doing => write!(f, "doing"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waiting" => Ok(TaskStatus::Waiting),
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            "canceled" => Ok(TaskStatus::Canceled),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Caller-initiated actions on a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Start,
    Done,
    Fail,
    Cancel,
}

impl TaskAction {
    pub fn target_status(&self) -> TaskStatus {
        match self {
            TaskAction::Start => TaskStatus::Doing,
            TaskAction::Done => TaskStatus::Done,
            TaskAction::Fail => TaskStatus::Failed,
            TaskAction::Cancel => TaskStatus::Canceled,
        }
    }

    /// Start, done and fail report execution progress and belong to the worker.
    pub fn is_execution_progress(&self) -> bool {
        !matches!(self, TaskAction::Cancel)
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskAction::Start => write!(f, "start"),
            TaskAction::Done => write!(f, "done"),
            TaskAction::Fail => write!(f, "fail"),
            TaskAction::Cancel => write!(f, "cancel"),
        }
    }
}

/// Where a declared input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskInput {
    /// A named output slot of one of the task's parents.
    ParentOutput {
        parent_task_key: TaskKey,
        output_identifier: String,
    },
    /// A registered data sample.
    DataSample { sample_key: SampleKey },
    /// An existing model, typically produced in another plan.
    Model { model_key: ModelKey },
}

/// A declared output slot of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub category: ModelCategory,
    #[serde(default)]
    pub permissions: Permissions,
    /// Set by DisableOutput, never cleared.
    #[serde(default)]
    pub disabled: bool,
}

impl TaskOutput {
    pub fn new(category: ModelCategory, permissions: Permissions) -> Self {
        Self {
            category,
            permissions,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeTask {
    pub key: TaskKey,
    pub plan_key: PlanKey,
    pub status: TaskStatus,
    /// Organization holding the exclusive right to report execution progress.
    pub worker: String,
    /// Organization that registered the task.
    pub owner: String,
    /// Ordered, duplicate-free.
    pub parent_task_keys: Vec<TaskKey>,
    pub inputs: BTreeMap<String, TaskInput>,
    pub outputs: BTreeMap<String, TaskOutput>,
    /// Logical time of the registering transaction.
    pub creation_date: DateTime<Utc>,
    /// Set when the task fails; the report shares the task key.
    pub failure_report: Option<TaskKey>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ComputeTask {
    /// Apply a caller action, enforcing the transition graph.
    pub fn apply(&mut self, action: TaskAction) -> Result<()> {
        let target = action.target_status();
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                key: self.key.to_string(),
                from: self.status.to_string(),
                action: action.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// WAITING → TODO once every parent is DONE.
    pub fn mark_ready(&mut self) -> Result<()> {
        if self.status != TaskStatus::Waiting {
            return Err(Error::InvalidTransition {
                key: self.key.to_string(),
                from: self.status.to_string(),
                action: "mark_ready".to_string(),
            });
        }
        self.status = TaskStatus::Todo;
        Ok(())
    }
}
