//! Input resolution for workers.
//!
//! Maps each declared input of a task to the address of the artifact behind
//! it. Resolution is read-only and all or nothing: one unresolvable,
//! disabled or forbidden input fails the whole call.

use serde::{Deserialize, Serialize};

use crate::auth;
use crate::core::{Addressable, AssetKind, ComputeTask, TaskInput, TaskKey, TaskStatus};
use crate::error::{Error, Result};
use crate::state::EntityStore;
use crate::store::KvStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInput {
    pub identifier: String,
    pub asset_kind: AssetKind,
    pub asset_key: String,
    pub address: Addressable,
}

/// Resolved inputs of `task_key`, ordered by input identifier.
pub fn resolve_task_inputs<S: KvStore + ?Sized>(
    store: &S,
    task_key: &TaskKey,
) -> Result<Vec<ResolvedInput>> {
    let task = store.get_task(task_key)?;
    task.inputs
        .iter()
        .map(|(identifier, input)| resolve_one(store, &task, identifier, input))
        .collect()
}

fn unresolved(task: &ComputeTask, identifier: &str, reason: String) -> Error {
    Error::invalid_input(task.key, format!("input {}: {}", identifier, reason))
}

fn resolve_one<S: KvStore + ?Sized>(
    store: &S,
    task: &ComputeTask,
    identifier: &str,
    input: &TaskInput,
) -> Result<ResolvedInput> {
    match input {
        TaskInput::ParentOutput {
            parent_task_key,
            output_identifier,
        } => {
            let Some(parent) = store.find_task(parent_task_key)? else {
                return Err(unresolved(task, identifier, format!("unknown parent {}", parent_task_key)));
            };
            if parent.status != TaskStatus::Done {
                return Err(unresolved(
                    task,
                    identifier,
                    format!("parent {} is {}", parent_task_key, parent.status),
                ));
            }
            let Some(output) = parent.outputs.get(output_identifier) else {
                return Err(unresolved(
                    task,
                    identifier,
                    format!("undeclared output {} of {}", output_identifier, parent_task_key),
                ));
            };
            if output.disabled {
                return Err(unresolved(
                    task,
                    identifier,
                    format!("output {} of {} is disabled", output_identifier, parent_task_key),
                ));
            }
            auth::require_process(
                &task.worker,
                &output.permissions.process,
                &parent_task_key.to_string(),
            )?;

            let model = store
                .task_models(parent_task_key)?
                .into_iter()
                .find(|model| model.output_identifier == *output_identifier && !model.disabled)
                .ok_or_else(|| {
                    unresolved(
                        task,
                        identifier,
                        format!("no model for output {} of {}", output_identifier, parent_task_key),
                    )
                })?;
            Ok(ResolvedInput {
                identifier: identifier.to_string(),
                asset_kind: AssetKind::Model,
                asset_key: model.key.to_string(),
                address: model.address,
            })
        }
        TaskInput::DataSample { sample_key } => {
            let Some(sample) = store.find_sample(sample_key)? else {
                return Err(unresolved(task, identifier, format!("unknown data sample {}", sample_key)));
            };
            auth::require_process(&task.worker, &sample.process, &sample_key.to_string())?;
            Ok(ResolvedInput {
                identifier: identifier.to_string(),
                asset_kind: AssetKind::DataSample,
                asset_key: sample.key.to_string(),
                address: sample.address,
            })
        }
        TaskInput::Model { model_key } => {
            let Some(model) = store.find_model(model_key)? else {
                return Err(unresolved(task, identifier, format!("unknown model {}", model_key)));
            };
            if model.disabled {
                return Err(unresolved(task, identifier, format!("model {} is disabled", model_key)));
            }
            auth::require_process(&task.worker, &model.permissions.process, &model_key.to_string())?;
            Ok(ResolvedInput {
                identifier: identifier.to_string(),
                asset_kind: AssetKind::Model,
                asset_key: model.key.to_string(),
                address: model.address,
            })
        }
    }
}
