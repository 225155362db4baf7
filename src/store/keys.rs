//! Store key layout.
//!
//! Every key is `<family>/<component>[/<component>]`. Components are
//! hyphenated lowercase UUIDs (fixed width) or zero-padded ordering keys, so
//! lexical key order equals primary-key order within a family and a family
//! prefix never matches another family.
//!
//! | key                                   | value                  |
//! |---------------------------------------|------------------------|
//! | `plan/<plan>`                         | ComputePlan            |
//! | `task/<task>`                         | ComputeTask            |
//! | `plan_task/<plan>/<task>`             | empty (index)          |
//! | `plan_counts/<plan>`                  | TaskStatusCounts       |
//! | `task_child/<parent>/<child>`         | empty (index)          |
//! | `model/<model>`                       | Model                  |
//! | `task_model/<task>/<model>`           | empty (index)          |
//! | `sample/<sample>`                     | DataSample             |
//! | `failure/<task>`                      | FailureReport          |
//! | `event/<ordering>`                    | Event                  |
//! | `asset_event/<asset>/<ordering>`      | empty (index)          |
//! | `meta/event_seq`                      | last ordering key      |

use crate::core::{ModelKey, PlanKey, SampleKey, TaskKey};

pub const PLAN_PREFIX: &str = "plan/";
pub const TASK_PREFIX: &str = "task/";
pub const MODEL_PREFIX: &str = "model/";
pub const SAMPLE_PREFIX: &str = "sample/";
pub const EVENT_PREFIX: &str = "event/";
pub const EVENT_SEQ: &str = "meta/event_seq";

pub fn plan(key: &PlanKey) -> String {
    format!("{}{}", PLAN_PREFIX, key)
}

pub fn task(key: &TaskKey) -> String {
    format!("{}{}", TASK_PREFIX, key)
}

pub fn plan_tasks_prefix(plan: &PlanKey) -> String {
    format!("plan_task/{}/", plan)
}

pub fn plan_task(plan: &PlanKey, task: &TaskKey) -> String {
    format!("{}{}", plan_tasks_prefix(plan), task)
}

/// Per-status task tally of a plan, kept in step with `put_task`.
pub fn plan_counts(plan: &PlanKey) -> String {
    format!("plan_counts/{}", plan)
}

pub fn task_children_prefix(parent: &TaskKey) -> String {
    format!("task_child/{}/", parent)
}

pub fn task_child(parent: &TaskKey, child: &TaskKey) -> String {
    format!("{}{}", task_children_prefix(parent), child)
}

pub fn model(key: &ModelKey) -> String {
    format!("{}{}", MODEL_PREFIX, key)
}

pub fn task_models_prefix(task: &TaskKey) -> String {
    format!("task_model/{}/", task)
}

pub fn task_model(task: &TaskKey, model: &ModelKey) -> String {
    format!("{}{}", task_models_prefix(task), model)
}

pub fn sample(key: &SampleKey) -> String {
    format!("{}{}", SAMPLE_PREFIX, key)
}

pub fn failure_report(task: &TaskKey) -> String {
    format!("failure/{}", task)
}

/// Zero-padded so lexical order is numeric order.
pub fn ordering_component(ordering_key: u64) -> String {
    format!("{:020}", ordering_key)
}

pub fn event(ordering_key: u64) -> String {
    format!("{}{}", EVENT_PREFIX, ordering_component(ordering_key))
}

pub fn asset_events_prefix(asset_key: &str) -> String {
    format!("asset_event/{}/", asset_key)
}

pub fn asset_event(asset_key: &str, ordering_key: u64) -> String {
    format!(
        "{}{}",
        asset_events_prefix(asset_key),
        ordering_component(ordering_key)
    )
}
