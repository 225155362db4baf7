//! Task graph state machine: registration, actions, readiness propagation,
//! cascading cancellation and output disablement.

use std::collections::{BTreeMap, BTreeSet};

use super::context::Session;
use super::params::{
    DisableOutputParam, NewComputeTask, NewFailureReport, NewModel, RegisterTasksParam,
    TaskActionKind, TaskActionParam, TaskFilter,
};
use crate::auth;
use crate::core::{
    AssetKind, ComputeTask, FailureReport, Model, PlanKey, RegistrationGraph, TaskAction,
    TaskInput, TaskKey, TaskStatus,
};
use crate::error::{Error, Result};
use crate::events::{EventKind, NewEvent};
use crate::pagination::{paginate, Page, PageLimits, Pagination};
use crate::state::EntityStore;
use crate::store::{keys, KvStore};
use crate::validation;
use crate::{flog_debug, flog_trace};

/// Register a batch of tasks of one plan.
///
/// The batch is validated as a whole and registered in dependency order, so
/// tasks may name other tasks of the same batch as parents.
pub fn register_tasks<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    param: RegisterTasksParam,
) -> Result<Vec<ComputeTask>> {
    let Some(first) = param.tasks.first() else {
        return Err(Error::invalid_input("tasks", "empty registration batch"));
    };
    let plan_key = first.plan_key;
    if let Some(stray) = param.tasks.iter().find(|t| t.plan_key != plan_key) {
        return Err(Error::invalid_input(
            stray.key,
            format!("batch targets plan {} but task targets {}", plan_key, stray.plan_key),
        ));
    }

    let plan = session.store.get_plan(&plan_key)?;
    auth::require_owner(session.principal, &plan.owner, &plan.key.to_string())?;
    let plan_status = session
        .store
        .plan_task_counts(&plan_key)?
        .plan_status(plan.is_canceled());
    if plan_status.is_closed() {
        return Err(Error::invalid_input(
            plan_key,
            format!("plan is {} and accepts no new tasks", plan_status),
        ));
    }

    let mut graph = RegistrationGraph::new();
    for new in &param.tasks {
        validate_new_task(new)?;
        graph.add_task(new.key)?;
        if session.store.contains(&keys::task(&new.key))? {
            return Err(Error::already_exists(AssetKind::ComputeTask, new.key));
        }
    }

    for new in &param.tasks {
        let mut seen = BTreeSet::new();
        for parent_key in &new.parent_task_keys {
            if !seen.insert(*parent_key) {
                return Err(Error::invalid_input(
                    new.key,
                    format!("parent {} listed twice", parent_key),
                ));
            }
            if graph.contains_task(parent_key) {
                graph.add_dependency(parent_key, &new.key)?;
            } else {
                check_registered_parent(session, &plan_key, new, parent_key)?;
            }
        }
    }

    let mut pending: BTreeMap<TaskKey, NewComputeTask> =
        param.tasks.into_iter().map(|t| (t.key, t)).collect();
    let mut registered = Vec::with_capacity(pending.len());
    for key in graph.registration_order()? {
        let Some(new) = pending.remove(&key) else {
            return Err(Error::Internal(format!("task {} missing from batch", key)));
        };
        let task = register_one(session, new)?;
        registered.push(task);
    }

    session.touch_plan(plan_key);
    flog_debug!(
        "registered {} tasks in plan {}",
        registered.len(),
        plan_key.short()
    );
    Ok(registered)
}

fn validate_new_task(new: &NewComputeTask) -> Result<()> {
    let key = new.key.to_string();
    validation::validate_org(&key, &new.worker)?;
    validation::validate_metadata(&key, &new.metadata)?;
    for identifier in new.inputs.keys() {
        validation::validate_identifier(&key, "input identifier", identifier)?;
    }
    for identifier in new.outputs.keys() {
        validation::validate_identifier(&key, "output identifier", identifier)?;
    }
    if new.parent_task_keys.contains(&new.key) {
        return Err(Error::invalid_input(new.key, "task cannot be its own parent"));
    }
    Ok(())
}

/// A parent outside the batch must already exist in the same plan and still
/// be able to produce outputs.
fn check_registered_parent<S: KvStore + ?Sized>(
    session: &Session<'_, S>,
    plan_key: &PlanKey,
    new: &NewComputeTask,
    parent_key: &TaskKey,
) -> Result<()> {
    let Some(parent) = session.store.find_task(parent_key)? else {
        return Err(Error::invalid_input(
            new.key,
            format!("unknown parent {}", parent_key),
        ));
    };
    if parent.plan_key != *plan_key {
        return Err(Error::invalid_input(
            new.key,
            format!("parent {} belongs to plan {}", parent_key, parent.plan_key),
        ));
    }
    if matches!(parent.status, TaskStatus::Failed | TaskStatus::Canceled) {
        return Err(Error::invalid_input(
            new.key,
            format!("parent {} is {}", parent_key, parent.status),
        ));
    }
    Ok(())
}

fn register_one<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    new: NewComputeTask,
) -> Result<ComputeTask> {
    for (identifier, input) in &new.inputs {
        check_input(session, &new, identifier, input)?;
    }

    // In-batch parents were registered WAITING or TODO, never DONE.
    let mut all_parents_done = true;
    for parent_key in &new.parent_task_keys {
        if session.store.get_task(parent_key)?.status != TaskStatus::Done {
            all_parents_done = false;
            break;
        }
    }

    let outputs = new
        .outputs
        .into_iter()
        .map(|(identifier, mut output)| {
            output.disabled = false;
            (identifier, output)
        })
        .collect();

    let task = ComputeTask {
        key: new.key,
        plan_key: new.plan_key,
        status: if all_parents_done {
            TaskStatus::Todo
        } else {
            TaskStatus::Waiting
        },
        worker: new.worker,
        owner: session.principal.to_string(),
        parent_task_keys: new.parent_task_keys,
        inputs: new.inputs,
        outputs,
        creation_date: session.ctx.timestamp,
        failure_report: None,
        metadata: new.metadata,
    };

    session.store.put_task(&task)?;
    for parent_key in &task.parent_task_keys {
        session.store.put_child_edge(parent_key, &task.key)?;
    }
    session.emit(NewEvent::new(
        AssetKind::ComputeTask,
        task.key,
        EventKind::Created,
        &task,
    )?)?;
    flog_trace!("task {} registered as {}", task.key.short(), task.status);
    Ok(task)
}

fn check_input<S: KvStore + ?Sized>(
    session: &Session<'_, S>,
    new: &NewComputeTask,
    identifier: &str,
    input: &TaskInput,
) -> Result<()> {
    match input {
        TaskInput::ParentOutput {
            parent_task_key,
            output_identifier,
        } => {
            if !new.parent_task_keys.contains(parent_task_key) {
                return Err(Error::invalid_input(
                    new.key,
                    format!(
                        "input {} reads from {} which is not a parent",
                        identifier, parent_task_key
                    ),
                ));
            }
            let parent = session.store.get_task(parent_task_key)?;
            let Some(output) = parent.outputs.get(output_identifier) else {
                return Err(Error::invalid_input(
                    new.key,
                    format!(
                        "input {} references undeclared output {} of {}",
                        identifier, output_identifier, parent_task_key
                    ),
                ));
            };
            if output.disabled {
                return Err(Error::invalid_input(
                    new.key,
                    format!(
                        "input {} references disabled output {} of {}",
                        identifier, output_identifier, parent_task_key
                    ),
                ));
            }
            auth::require_process(
                &new.worker,
                &output.permissions.process,
                &parent_task_key.to_string(),
            )
        }
        TaskInput::DataSample { sample_key } => {
            let Some(sample) = session.store.find_sample(sample_key)? else {
                return Err(Error::invalid_input(
                    new.key,
                    format!("input {} references unknown data sample {}", identifier, sample_key),
                ));
            };
            auth::require_process(&new.worker, &sample.process, &sample_key.to_string())
        }
        TaskInput::Model { model_key } => {
            let Some(model) = session.store.find_model(model_key)? else {
                return Err(Error::invalid_input(
                    new.key,
                    format!("input {} references unknown model {}", identifier, model_key),
                ));
            };
            if model.disabled {
                return Err(Error::invalid_input(
                    new.key,
                    format!("input {} references disabled model {}", identifier, model_key),
                ));
            }
            auth::require_process(
                &new.worker,
                &model.permissions.process,
                &model_key.to_string(),
            )
        }
    }
}

/// Apply start, done, fail or cancel to one task.
pub fn apply_task_action<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    param: TaskActionParam,
) -> Result<ComputeTask> {
    let mut task = session.store.get_task(&param.task_key)?;
    let action = param.action.action();
    if action.is_execution_progress() {
        auth::require_worker(session.principal, &task)?;
    } else {
        let plan = session.store.get_plan(&task.plan_key)?;
        auth::require_canceler(session.principal, &task, &plan)?;
    }
    let from = task.status;
    task.apply(action)?;

    match param.action {
        TaskActionKind::Start | TaskActionKind::Cancel => {
            save_task_update(session, &task, &[])?;
        }
        TaskActionKind::Done { models } => {
            let models = build_models(session, &task, models)?;
            save_task_update(session, &task, &[])?;
            for model in &models {
                session.store.put_model(model)?;
                session.emit(
                    NewEvent::new(AssetKind::Model, model.key, EventKind::Created, model)?
                        .with_metadata("output_identifier", &model.output_identifier),
                )?;
            }
            propagate_readiness(session, &task)?;
        }
        TaskActionKind::Fail { failure_report } => {
            let report = build_failure_report(session, &task, failure_report);
            task.failure_report = Some(task.key);
            save_task_update(session, &task, &[])?;
            session.store.put_failure_report(&report)?;
            session.emit(NewEvent::new(
                AssetKind::FailureReport,
                task.key,
                EventKind::Created,
                &report,
            )?)?;
        }
    }

    if matches!(action, TaskAction::Fail | TaskAction::Cancel) {
        cascade_cancel(session, &task.key)?;
    }

    session.touch_plan(task.plan_key);
    flog_debug!(
        "task {} {} -> {} by {}",
        task.key.short(),
        from,
        task.status,
        session.principal
    );
    Ok(task)
}

fn save_task_update<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    task: &ComputeTask,
    metadata: &[(&str, String)],
) -> Result<()> {
    session.store.put_task(task)?;
    let mut draft = NewEvent::new(AssetKind::ComputeTask, task.key, EventKind::Updated, task)?
        .with_metadata("status", task.status);
    for (key, value) in metadata {
        draft = draft.with_metadata(key, value);
    }
    session.emit(draft)
}

/// Exactly one model per declared output, in output identifier order.
fn build_models<S: KvStore + ?Sized>(
    session: &Session<'_, S>,
    task: &ComputeTask,
    models: Vec<NewModel>,
) -> Result<Vec<Model>> {
    let mut by_output: BTreeMap<String, NewModel> = BTreeMap::new();
    let mut model_keys = BTreeSet::new();
    for model in models {
        if !task.outputs.contains_key(&model.output_identifier) {
            return Err(Error::invalid_input(
                task.key,
                format!("model for undeclared output {}", model.output_identifier),
            ));
        }
        if !model_keys.insert(model.key)
            || session.store.contains(&keys::model(&model.key))?
        {
            return Err(Error::already_exists(AssetKind::Model, model.key));
        }
        let identifier = model.output_identifier.clone();
        if by_output.insert(identifier.clone(), model).is_some() {
            return Err(Error::invalid_input(
                task.key,
                format!("several models for output {}", identifier),
            ));
        }
    }
    if let Some(missing) = task.outputs.keys().find(|id| !by_output.contains_key(*id)) {
        return Err(Error::invalid_input(
            task.key,
            format!("no model for declared output {}", missing),
        ));
    }

    Ok(by_output
        .into_iter()
        .filter_map(|(identifier, new)| {
            task.outputs.get(&identifier).map(|output| Model {
                key: new.key,
                compute_task_key: task.key,
                output_identifier: identifier,
                category: output.category,
                address: new.address,
                permissions: output.permissions.clone(),
                owner: task.worker.clone(),
                creation_date: session.ctx.timestamp,
                disabled: false,
            })
        })
        .collect())
}

fn build_failure_report<S: KvStore + ?Sized>(
    session: &Session<'_, S>,
    task: &ComputeTask,
    new: NewFailureReport,
) -> FailureReport {
    FailureReport {
        compute_task_key: task.key,
        logs_address: new.logs_address,
        asset_type: new.asset_type,
        owner: session.principal.to_string(),
        creation_date: session.ctx.timestamp,
    }
}

/// Move direct children of a DONE task to TODO once all their parents are DONE.
fn propagate_readiness<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    done: &ComputeTask,
) -> Result<()> {
    for child_key in session.store.child_keys(&done.key)? {
        let mut child = session.store.get_task(&child_key)?;
        if child.status != TaskStatus::Waiting {
            continue;
        }
        let mut ready = true;
        for parent_key in &child.parent_task_keys {
            if session.store.get_task(parent_key)?.status != TaskStatus::Done {
                ready = false;
                break;
            }
        }
        if ready {
            child.mark_ready()?;
            save_task_update(session, &child, &[("ready_after", done.key.to_string())])?;
        }
    }
    Ok(())
}

/// Cancel every active descendant of `origin`.
///
/// Depth-first with an explicit stack, visiting children in key order. The
/// walk stops at tasks that are already terminal.
pub(crate) fn cascade_cancel<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    origin: &TaskKey,
) -> Result<usize> {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<TaskKey> = session.store.child_keys(origin)?;
    stack.reverse();
    let mut canceled = 0;

    while let Some(key) = stack.pop() {
        if !visited.insert(key) {
            continue;
        }
        let mut task = session.store.get_task(&key)?;
        if task.status.is_terminal() {
            continue;
        }
        task.apply(TaskAction::Cancel)?;
        save_task_update(session, &task, &[("canceled_by", origin.to_string())])?;
        session.touch_plan(task.plan_key);
        canceled += 1;

        for child in session.store.child_keys(&key)?.into_iter().rev() {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }

    if canceled > 0 {
        flog_debug!("cascade from {} canceled {} tasks", origin.short(), canceled);
    }
    Ok(canceled)
}

/// Disable one output of a DONE task and every model produced for it.
///
/// Disabling is one-way; disabling an already disabled output changes nothing.
pub fn disable_output<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    param: DisableOutputParam,
) -> Result<ComputeTask> {
    let mut task = session.store.get_task(&param.task_key)?;
    let Some(output) = task.outputs.get(&param.output_identifier) else {
        return Err(Error::invalid_input(
            task.key,
            format!("undeclared output {}", param.output_identifier),
        ));
    };
    auth::require_disabler(session.principal, &task, output)?;
    if task.status != TaskStatus::Done {
        return Err(Error::InvalidTransition {
            key: task.key.to_string(),
            from: task.status.to_string(),
            action: "disable_output".to_string(),
        });
    }
    if output.disabled {
        return Ok(task);
    }

    if let Some(output) = task.outputs.get_mut(&param.output_identifier) {
        output.disabled = true;
    }
    save_task_update(
        session,
        &task,
        &[("disabled_output", param.output_identifier.clone())],
    )?;

    for mut model in session.store.task_models(&task.key)? {
        if model.output_identifier != param.output_identifier || model.disabled {
            continue;
        }
        model.disabled = true;
        session.store.put_model(&model)?;
        session.emit(NewEvent::new(
            AssetKind::Model,
            model.key,
            EventKind::Disabled,
            &model,
        )?)?;
    }
    flog_debug!(
        "output {} of task {} disabled",
        param.output_identifier,
        task.key.short()
    );
    Ok(task)
}

// Reads

/// Tasks in key order. A plan filter walks that plan's index.
pub fn query_tasks<S: KvStore + ?Sized>(
    store: &S,
    filter: &TaskFilter,
    pagination: &Pagination,
    limits: &PageLimits,
) -> Result<Page<ComputeTask>> {
    let matches = |task: &ComputeTask| {
        filter.plan_key.map_or(true, |plan| plan == task.plan_key)
            && filter.status.map_or(true, |status| status == task.status)
            && filter
                .worker
                .as_deref()
                .map_or(true, |worker| worker == task.worker)
    };

    match &filter.plan_key {
        Some(plan_key) => paginate(
            store,
            &keys::plan_tasks_prefix(plan_key),
            pagination,
            limits,
            |task_key, _| {
                let key: TaskKey = task_key.parse().map_err(|e| {
                    Error::Internal(format!("corrupt plan index entry {}: {}", task_key, e))
                })?;
                let task = store.get_task(&key)?;
                Ok(matches(&task).then_some(task))
            },
        ),
        None => paginate(store, keys::TASK_PREFIX, pagination, limits, |_, bytes| {
            let task: ComputeTask = serde_json::from_slice(bytes)?;
            Ok(matches(&task).then_some(task))
        }),
    }
}

/// Models produced by a task, in model key order.
pub fn output_models<S: KvStore + ?Sized>(store: &S, task_key: &TaskKey) -> Result<Vec<Model>> {
    store.get_task(task_key)?;
    store.task_models(task_key)
}
