//! Orchestrator - the engine's single entry point.

use super::context::{Session, TxContext};
use super::params::{
    DisableOutputParam, ModelFilter, NewComputePlan, PlanActionParam, PlanFilter,
    RegisterDataSamplesParam, RegisterTasksParam, SampleFilter, TaskActionParam, TaskFilter,
};
use super::{models, plans, samples, tasks};
use crate::config::Config;
use crate::core::{
    ComputePlan, ComputeTask, DataSample, FailureReport, Model, ModelKey, PlanKey, SampleKey,
    TaskKey,
};
use crate::error::Result;
use crate::events::{self, Event, EventFilter};
use crate::pagination::{Page, PageLimits, Pagination};
use crate::resolver::{self, ResolvedInput};
use crate::state::EntityStore;
use crate::store::KvStore;
use crate::{flog, flog_debug, flog_warn};

/// Runs operations against a store, one at a time.
///
/// Every mutation executes in a [`Session`] over a staged view of the store
/// and commits only if the whole action succeeds, cascades and status
/// projections included. Reads go straight to the store.
pub struct Orchestrator<S: KvStore> {
    store: S,
    limits: PageLimits,
}

impl<S: KvStore> Orchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            limits: PageLimits::default(),
        }
    }

    pub fn with_config(store: S, config: &Config) -> Self {
        Self {
            store,
            limits: config.page_limits(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn page_limits(&self) -> PageLimits {
        self.limits
    }

    /// Run `action` in a fresh session and commit its writes on success.
    fn execute<T, F>(&mut self, ctx: &TxContext, principal: &str, name: &str, action: F) -> Result<T>
    where
        F: FnOnce(&mut Session<'_, S>) -> Result<T>,
    {
        let outcome = {
            let mut session = Session::new(&self.store, ctx, principal);
            action(&mut session).and_then(|value| {
                let (writes, events) = session.finish()?;
                Ok((value, writes, events.len()))
            })
        };

        match outcome {
            Ok((value, writes, event_count)) => {
                let write_count = writes.len();
                for (key, bytes) in writes {
                    self.store.put(&key, bytes)?;
                }
                flog!(
                    "{} tx={} principal={} committed {} writes, {} events",
                    name,
                    ctx.tx_id,
                    principal,
                    write_count,
                    event_count
                );
                Ok(value)
            }
            Err(e) => {
                flog_warn!(
                    "{} tx={} principal={} rejected: {} ({})",
                    name,
                    ctx.tx_id,
                    principal,
                    e,
                    e.kind()
                );
                Err(e)
            }
        }
    }

    // Mutations

    pub fn register_plan(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: NewComputePlan,
    ) -> Result<ComputePlan> {
        self.execute(ctx, principal, "RegisterPlan", |s| plans::register_plan(s, param))
    }

    pub fn apply_plan_action(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: PlanActionParam,
    ) -> Result<ComputePlan> {
        self.execute(ctx, principal, "ApplyPlanAction", |s| {
            plans::apply_plan_action(s, param)
        })
    }

    pub fn register_tasks(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: RegisterTasksParam,
    ) -> Result<Vec<ComputeTask>> {
        self.execute(ctx, principal, "RegisterTasks", |s| tasks::register_tasks(s, param))
    }

    pub fn apply_task_action(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: TaskActionParam,
    ) -> Result<ComputeTask> {
        self.execute(ctx, principal, "ApplyTaskAction", |s| {
            tasks::apply_task_action(s, param)
        })
    }

    pub fn disable_output(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: DisableOutputParam,
    ) -> Result<ComputeTask> {
        self.execute(ctx, principal, "DisableOutput", |s| tasks::disable_output(s, param))
    }

    pub fn register_data_samples(
        &mut self,
        ctx: &TxContext,
        principal: &str,
        param: RegisterDataSamplesParam,
    ) -> Result<Vec<DataSample>> {
        self.execute(ctx, principal, "RegisterDataSamples", |s| {
            samples::register_data_samples(s, param)
        })
    }

    // Reads

    /// Status recomputed from the plan's tasks.
    pub fn get_compute_plan(&self, key: &PlanKey) -> Result<ComputePlan> {
        plans::get_plan(&self.store, key)
    }

    pub fn query_compute_plans(
        &self,
        filter: &PlanFilter,
        pagination: &Pagination,
    ) -> Result<Page<ComputePlan>> {
        plans::query_plans(&self.store, filter, pagination, &self.limits)
    }

    pub fn is_plan_running(&self, key: &PlanKey) -> Result<bool> {
        plans::is_plan_running(&self.store, key)
    }

    pub fn get_compute_task(&self, key: &TaskKey) -> Result<ComputeTask> {
        self.store.get_task(key)
    }

    pub fn query_compute_tasks(
        &self,
        filter: &TaskFilter,
        pagination: &Pagination,
    ) -> Result<Page<ComputeTask>> {
        tasks::query_tasks(&self.store, filter, pagination, &self.limits)
    }

    pub fn get_model(&self, key: &ModelKey) -> Result<Model> {
        self.store.get_model(key)
    }

    pub fn query_models(&self, filter: &ModelFilter, pagination: &Pagination) -> Result<Page<Model>> {
        models::query_models(&self.store, filter, pagination, &self.limits)
    }

    pub fn get_compute_task_output_models(&self, task_key: &TaskKey) -> Result<Vec<Model>> {
        tasks::output_models(&self.store, task_key)
    }

    pub fn get_data_sample(&self, key: &SampleKey) -> Result<DataSample> {
        self.store.get_sample(key)
    }

    pub fn query_data_samples(
        &self,
        filter: &SampleFilter,
        pagination: &Pagination,
    ) -> Result<Page<DataSample>> {
        samples::query_samples(&self.store, filter, pagination, &self.limits)
    }

    pub fn get_failure_report(&self, task_key: &TaskKey) -> Result<FailureReport> {
        self.store.get_failure_report(task_key)
    }

    pub fn query_events(&self, filter: &EventFilter, pagination: &Pagination) -> Result<Page<Event>> {
        events::query_events(&self.store, filter, pagination, &self.limits)
    }

    pub fn get_task_input_assets(&self, task_key: &TaskKey) -> Result<Vec<ResolvedInput>> {
        flog_debug!("resolving inputs of task {}", task_key.short());
        resolver::resolve_task_inputs(&self.store, task_key)
    }
}
