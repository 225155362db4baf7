//! Authorization guard.
//!
//! The principal is the authenticated organization id handed over by the
//! identity layer. It is compared for equality and never interpreted. Every
//! guard runs before the action it protects writes anything.

use crate::core::{ComputePlan, ComputeTask, Permission, TaskOutput};
use crate::error::{Error, Result};

/// Only the owner may act on `key`.
pub fn require_owner(principal: &str, owner: &str, key: &str) -> Result<()> {
    if principal == owner {
        Ok(())
    } else {
        Err(Error::permission_denied(
            principal,
            key,
            format!("owned by {}", owner),
        ))
    }
}

/// Start, done and fail are reserved to the task's worker.
pub fn require_worker(principal: &str, task: &ComputeTask) -> Result<()> {
    if principal == task.worker {
        Ok(())
    } else {
        Err(Error::permission_denied(
            principal,
            task.key,
            format!("worker is {}", task.worker),
        ))
    }
}

/// Cancel is open to the task owner and to the owner of its plan.
pub fn require_canceler(principal: &str, task: &ComputeTask, plan: &ComputePlan) -> Result<()> {
    if principal == task.owner || principal == plan.owner {
        Ok(())
    } else {
        Err(Error::permission_denied(
            principal,
            task.key,
            "only the task or plan owner can cancel",
        ))
    }
}

/// DisableOutput is open to the task owner and to the output's disable list.
pub fn require_disabler(principal: &str, task: &ComputeTask, output: &TaskOutput) -> Result<()> {
    if principal == task.owner || output.permissions.disable.allows(principal) {
        Ok(())
    } else {
        Err(Error::permission_denied(
            principal,
            task.key,
            "not allowed to disable this output",
        ))
    }
}

/// `org` must hold process rights on the asset identified by `key`.
pub fn require_process(org: &str, permission: &Permission, key: &str) -> Result<()> {
    if permission.allows(org) {
        Ok(())
    } else {
        Err(Error::permission_denied(
            org,
            key,
            "no process permission",
        ))
    }
}
