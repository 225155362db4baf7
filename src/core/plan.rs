//! Compute plans and their aggregate status.
//!
//! A plan's status is never set directly (except by an explicit cancel): it
//! is a pure function of the statuses of the plan's tasks, see
//! [`TaskStatusCounts::plan_status`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::task::TaskStatus;

asset_key!(
    /// Unique identifier of a compute plan.
    PlanKey
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Waiting,
    Todo,
    Doing,
    Done,
    Failed,
    Canceled,
}

impl PlanStatus {
    /// FAILED and CANCELED plans accept no further tasks.
    pub fn is_closed(&self) -> bool {
        matches!(self, PlanStatus::Failed | PlanStatus::Canceled)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Waiting => write!(f, "waiting"),
            PlanStatus::Todo => write!(f, "todo"),
            PlanStatus::Doing => write!(f, "doing"),
            PlanStatus::Done => write!(f, "done"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Number of tasks per status within one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusCounts {
    pub waiting: usize,
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl TaskStatusCounts {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        let mut counts = Self::default();
        for status in statuses {
            counts.add(status);
        }
        counts
    }

    pub fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Waiting => self.waiting += 1,
            TaskStatus::Todo => self.todo += 1,
            TaskStatus::Doing => self.doing += 1,
            TaskStatus::Done => self.done += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Canceled => self.canceled += 1,
        }
    }

    pub fn remove(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::Waiting => &mut self.waiting,
            TaskStatus::Todo => &mut self.todo,
            TaskStatus::Doing => &mut self.doing,
            TaskStatus::Done => &mut self.done,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Canceled => &mut self.canceled,
        };
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> usize {
        self.waiting + self.todo + self.doing + self.done + self.failed + self.canceled
    }

    /// Tasks that can still make progress.
    pub fn active(&self) -> usize {
        self.waiting + self.todo + self.doing
    }

    /// Aggregate plan status. Rules are evaluated in order:
    ///
    /// 1. explicitly canceled → CANCELED
    /// 2. empty plan → TODO
    /// 3. any FAILED → FAILED
    /// 4. any DOING → DOING
    /// 5. any TODO → TODO
    /// 6. every task DONE → DONE
    /// 7. otherwise → WAITING
    pub fn plan_status(&self, explicitly_canceled: bool) -> PlanStatus {
        if explicitly_canceled {
            PlanStatus::Canceled
        } else if self.total() == 0 {
            PlanStatus::Todo
        } else if self.failed > 0 {
            PlanStatus::Failed
        } else if self.doing > 0 {
            PlanStatus::Doing
        } else if self.todo > 0 {
            PlanStatus::Todo
        } else if self.done == self.total() {
            PlanStatus::Done
        } else {
            PlanStatus::Waiting
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputePlan {
    pub key: PlanKey,
    pub owner: String,
    pub name: String,
    /// Write-time projection of the aggregate status. Reads recompute it.
    pub status: PlanStatus,
    pub creation_date: DateTime<Utc>,
    /// Set by an explicit plan cancel.
    pub cancelation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ComputePlan {
    pub fn is_canceled(&self) -> bool {
        self.cancelation_date.is_some()
    }
}
