//! Data samples: standalone assets that task inputs may reference.

use std::collections::BTreeSet;

use super::context::Session;
use super::params::{RegisterDataSamplesParam, SampleFilter};
use crate::core::{AssetKind, DataSample};
use crate::error::{Error, Result};
use crate::events::{EventKind, NewEvent};
use crate::pagination::{paginate, Page, PageLimits, Pagination};
use crate::state::EntityStore;
use crate::store::{keys, KvStore};
use crate::{flog_debug, validation};

pub fn register_data_samples<S: KvStore + ?Sized>(
    session: &mut Session<'_, S>,
    param: RegisterDataSamplesParam,
) -> Result<Vec<DataSample>> {
    if param.samples.is_empty() {
        return Err(Error::invalid_input("samples", "empty registration batch"));
    }
    validation::validate_org("samples", session.principal)?;

    let mut seen = BTreeSet::new();
    let mut registered = Vec::with_capacity(param.samples.len());
    for new in param.samples {
        validation::validate_metadata(&new.key.to_string(), &new.metadata)?;
        if !seen.insert(new.key) || session.store.find_sample(&new.key)?.is_some() {
            return Err(Error::already_exists(AssetKind::DataSample, new.key));
        }

        let sample = DataSample {
            key: new.key,
            owner: session.principal.to_string(),
            address: new.address,
            process: new.process,
            creation_date: session.ctx.timestamp,
            metadata: new.metadata,
        };
        session.store.put_sample(&sample)?;
        session.emit(NewEvent::new(
            AssetKind::DataSample,
            sample.key,
            EventKind::Created,
            &sample,
        )?)?;
        registered.push(sample);
    }

    flog_debug!(
        "{} data samples registered by {}",
        registered.len(),
        session.principal
    );
    Ok(registered)
}

pub fn query_samples<S: KvStore + ?Sized>(
    store: &S,
    filter: &SampleFilter,
    pagination: &Pagination,
    limits: &PageLimits,
) -> Result<Page<DataSample>> {
    paginate(store, keys::SAMPLE_PREFIX, pagination, limits, |_, bytes| {
        let sample: DataSample = serde_json::from_slice(bytes)?;
        Ok(filter
            .owner
            .as_deref()
            .map_or(true, |owner| owner == sample.owner)
            .then_some(sample))
    })
}
