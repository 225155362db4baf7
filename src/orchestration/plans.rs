//! Plan aggregator: plan registration, plan-wide cancel and status reads.

use super::context::Session;
use super::params::{NewComputePlan, PlanAction, PlanActionParam, PlanFilter};
use super::tasks::cascade_cancel;
use crate::auth;
use crate::core::{AssetKind, ComputePlan, PlanKey, PlanStatus, TaskAction};
use crate::error::{Error, Result};
use crate::events::{EventKind, NewEvent};
use crate::pagination::{paginate, Page, PageLimits, Pagination};
use crate::state::EntityStore;
use crate::store::{keys, KvStore};
use crate::{flog_debug, validation};

pub fn register_plan<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    new: NewComputePlan,
) -> Result<ComputePlan> {
    let key = new.key.to_string();
    validation::validate_org(&key, session.principal)?;
    validation::validate_metadata(&key, &new.metadata)?;
    if session.store.find_plan(&new.key)?.is_some() {
        return Err(Error::already_exists(AssetKind::ComputePlan, new.key));
    }

    let plan = ComputePlan {
        key: new.key,
        owner: session.principal.to_string(),
        name: new.name,
        status: PlanStatus::Todo,
        creation_date: session.ctx.timestamp,
        cancelation_date: None,
        tags: new.tags,
        metadata: new.metadata,
    };
    session.store.put_plan(&plan)?;
    session.emit(NewEvent::new(
        AssetKind::ComputePlan,
        plan.key,
        EventKind::Created,
        &plan,
    )?)?;
    flog_debug!("plan {} registered by {}", plan.key.short(), plan.owner);
    Ok(plan)
}

/// Plan-wide actions. Cancel is idempotent on an already canceled plan.
pub fn apply_plan_action<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    param: PlanActionParam,
) -> Result<ComputePlan> {
    let mut plan = session.store.get_plan(&param.plan_key)?;
    auth::require_owner(session.principal, &plan.owner, &plan.key.to_string())?;

    match param.action {
        PlanAction::Cancel => {
            if plan.is_canceled() {
                return Ok(plan);
            }
            let status = session
                .store
                .plan_task_counts(&plan.key)?
                .plan_status(false);
            if matches!(status, PlanStatus::Done | PlanStatus::Failed) {
                return Err(Error::InvalidTransition {
                    key: plan.key.to_string(),
                    from: status.to_string(),
                    action: "cancel".to_string(),
                });
            }

            plan.cancelation_date = Some(session.ctx.timestamp);
            plan.status = PlanStatus::Canceled;
            session.store.put_plan(&plan)?;
            session.emit(
                NewEvent::new(AssetKind::ComputePlan, plan.key, EventKind::Updated, &plan)?
                    .with_metadata("status", plan.status),
            )?;

            let mut canceled = 0;
            for task_key in session.store.plan_task_keys(&plan.key)? {
                // Earlier cascades may already have reached this task.
                let mut task = session.store.get_task(&task_key)?;
                if task.status.is_terminal() {
                    continue;
                }
                task.apply(TaskAction::Cancel)?;
                session.store.put_task(&task)?;
                session.emit(
                    NewEvent::new(AssetKind::ComputeTask, task.key, EventKind::Updated, &task)?
                        .with_metadata("status", task.status)
                        .with_metadata("canceled_by", plan.key),
                )?;
                canceled += 1 + cascade_cancel(session, &task.key)?;
            }
            session.touch_plan(plan.key);
            flog_debug!(
                "plan {} canceled, {} tasks canceled",
                plan.key.short(),
                canceled
            );
        }
    }
    Ok(plan)
}

/// Plan with its status recomputed from the current task set.
pub fn with_derived_status<S: KvStore + ?Sized>(
    store: &S,
    mut plan: ComputePlan,
) -> Result<ComputePlan> {
    plan.status = store
        .plan_task_counts(&plan.key)?
        .plan_status(plan.is_canceled());
    Ok(plan)
}

pub fn get_plan<S: KvStore + ?Sized>(store: &S, key: &PlanKey) -> Result<ComputePlan> {
    with_derived_status(store, store.get_plan(key)?)
}

/// At least one task is WAITING, TODO or DOING.
pub fn is_plan_running<S: KvStore + ?Sized>(store: &S, key: &PlanKey) -> Result<bool> {
    store.get_plan(key)?;
    Ok(store.plan_task_counts(key)?.active() > 0)
}

pub fn query_plans<S: KvStore + ?Sized>(
    store: &S,
    filter: &PlanFilter,
    pagination: &Pagination,
    limits: &PageLimits,
) -> Result<Page<ComputePlan>> {
    paginate(store, keys::PLAN_PREFIX, pagination, limits, |_, bytes| {
        let plan: ComputePlan = serde_json::from_slice(bytes)?;
        if filter.owner.as_deref().is_some_and(|owner| owner != plan.owner) {
            return Ok(None);
        }
        let plan = with_derived_status(store, plan)?;
        Ok(filter
            .status
            .map_or(true, |status| status == plan.status)
            .then_some(plan))
    })
}
