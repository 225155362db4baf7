//! Model reads. Models are only ever created by a task reaching DONE.

use super::params::ModelFilter;
use crate::core::{Model, ModelKey};
use crate::error::{Error, Result};
use crate::pagination::{paginate, Page, PageLimits, Pagination};
use crate::state::EntityStore;
use crate::store::{keys, KvStore};

/// Models in key order. A producing-task filter walks that task's index.
pub fn query_models<S: KvStore + ?Sized>(
    store: &S,
    filter: &ModelFilter,
    pagination: &Pagination,
    limits: &PageLimits,
) -> Result<Page<Model>> {
    match &filter.compute_task_key {
        Some(task_key) => paginate(
            store,
            &keys::task_models_prefix(task_key),
            pagination,
            limits,
            |model_key, _| {
                let key: ModelKey = model_key.parse().map_err(|e| {
                    Error::Internal(format!("corrupt model index entry {}: {}", model_key, e))
                })?;
                store.get_model(&key).map(Some)
            },
        ),
        None => paginate(store, keys::MODEL_PREFIX, pagination, limits, |_, bytes| {
            Ok(Some(serde_json::from_slice(bytes)?))
        }),
    }
}
