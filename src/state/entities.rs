//! EntityStore - typed get/put for every entity family.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

use crate::core::{
    AssetKind, ComputePlan, ComputeTask, DataSample, FailureReport, Model, ModelKey, PlanKey,
    SampleKey, TaskKey, TaskStatusCounts,
};
use crate::error::{Error, Result};
use crate::store::{keys, KvStore};

/// Index scans walk the store in batches of this size.
const INDEX_BATCH: usize = 256;

/// Typed view of a [`KvStore`].
///
/// Implemented for every store, including [`crate::store::StagedStore`], so
/// the same accessors serve reads and in-flight actions.
pub trait EntityStore: KvStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Primary keys listed under an index prefix, in key order.
    fn index_entries<K>(&self, prefix: &str) -> Result<Vec<K>>
    where
        K: FromStr,
        K::Err: std::fmt::Display,
    {
        let mut out = Vec::new();
        let mut token = String::new();
        loop {
            let (entries, next) = self.query_by_prefix(prefix, &token, INDEX_BATCH)?;
            for (key, _) in entries {
                let suffix = key.strip_prefix(prefix).unwrap_or(&key);
                let parsed = suffix.parse::<K>().map_err(|e| {
                    Error::Internal(format!("corrupt index entry {}: {}", key, e))
                })?;
                out.push(parsed);
            }
            if next.is_empty() {
                return Ok(out);
            }
            token = next;
        }
    }

    // Plans

    fn find_plan(&self, key: &PlanKey) -> Result<Option<ComputePlan>> {
        self.load(&keys::plan(key))
    }

    fn get_plan(&self, key: &PlanKey) -> Result<ComputePlan> {
        self.find_plan(key)?
            .ok_or_else(|| Error::not_found(AssetKind::ComputePlan, key))
    }

    fn put_plan(&mut self, plan: &ComputePlan) -> Result<()> {
        self.save(&keys::plan(&plan.key), plan)
    }

    fn plan_task_keys(&self, plan: &PlanKey) -> Result<Vec<TaskKey>> {
        self.index_entries(&keys::plan_tasks_prefix(plan))
    }

    fn plan_tasks(&self, plan: &PlanKey) -> Result<Vec<ComputeTask>> {
        self.plan_task_keys(plan)?
            .iter()
            .map(|key| self.get_task(key))
            .collect()
    }

    /// Stored tally, maintained by [`EntityStore::put_task`].
    fn plan_task_counts(&self, plan: &PlanKey) -> Result<TaskStatusCounts> {
        Ok(self.load(&keys::plan_counts(plan))?.unwrap_or_default())
    }

    /// Tally rebuilt from every task of the plan.
    fn recount_plan_tasks(&self, plan: &PlanKey) -> Result<TaskStatusCounts> {
        Ok(TaskStatusCounts::from_statuses(
            self.plan_tasks(plan)?.into_iter().map(|task| task.status),
        ))
    }

    // Tasks

    fn find_task(&self, key: &TaskKey) -> Result<Option<ComputeTask>> {
        self.load(&keys::task(key))
    }

    fn get_task(&self, key: &TaskKey) -> Result<ComputeTask> {
        self.find_task(key)?
            .ok_or_else(|| Error::not_found(AssetKind::ComputeTask, key))
    }

    /// Writes the task, its plan index entry and the plan's status tally.
    ///
    /// A task never changes plans, so only the status delta is applied.
    fn put_task(&mut self, task: &ComputeTask) -> Result<()> {
        let previous = self.find_task(&task.key)?.map(|prev| prev.status);
        if previous != Some(task.status) {
            let mut counts = self.plan_task_counts(&task.plan_key)?;
            if let Some(status) = previous {
                counts.remove(status);
            }
            counts.add(task.status);
            self.save(&keys::plan_counts(&task.plan_key), &counts)?;
        }
        self.save(&keys::task(&task.key), task)?;
        self.put(&keys::plan_task(&task.plan_key, &task.key), Vec::new())
    }

    fn put_child_edge(&mut self, parent: &TaskKey, child: &TaskKey) -> Result<()> {
        self.put(&keys::task_child(parent, child), Vec::new())
    }

    /// Direct children of `parent`, in key order.
    fn child_keys(&self, parent: &TaskKey) -> Result<Vec<TaskKey>> {
        self.index_entries(&keys::task_children_prefix(parent))
    }

    // Models

    fn find_model(&self, key: &ModelKey) -> Result<Option<Model>> {
        self.load(&keys::model(key))
    }

    fn get_model(&self, key: &ModelKey) -> Result<Model> {
        self.find_model(key)?
            .ok_or_else(|| Error::not_found(AssetKind::Model, key))
    }

    /// Writes the model and its producing-task index entry.
    fn put_model(&mut self, model: &Model) -> Result<()> {
        self.save(&keys::model(&model.key), model)?;
        self.put(
            &keys::task_model(&model.compute_task_key, &model.key),
            Vec::new(),
        )
    }

    fn task_models(&self, task: &TaskKey) -> Result<Vec<Model>> {
        self.index_entries::<ModelKey>(&keys::task_models_prefix(task))?
            .iter()
            .map(|key| self.get_model(key))
            .collect()
    }

    // Data samples

    fn find_sample(&self, key: &SampleKey) -> Result<Option<DataSample>> {
        self.load(&keys::sample(key))
    }

    fn get_sample(&self, key: &SampleKey) -> Result<DataSample> {
        self.find_sample(key)?
            .ok_or_else(|| Error::not_found(AssetKind::DataSample, key))
    }

    fn put_sample(&mut self, sample: &DataSample) -> Result<()> {
        self.save(&keys::sample(&sample.key), sample)
    }

    // Failure reports

    fn find_failure_report(&self, task: &TaskKey) -> Result<Option<FailureReport>> {
        self.load(&keys::failure_report(task))
    }

    fn get_failure_report(&self, task: &TaskKey) -> Result<FailureReport> {
        self.find_failure_report(task)?
            .ok_or_else(|| Error::not_found(AssetKind::FailureReport, task))
    }

    fn put_failure_report(&mut self, report: &FailureReport) -> Result<()> {
        self.save(&keys::failure_report(&report.compute_task_key), report)
    }
}

impl<S: KvStore + ?Sized> EntityStore for S {}
