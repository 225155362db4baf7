//! Orchestration layer of the engine.
//!
//! This module holds the operation services (task graph, plans, samples,
//! models), the per-action [`Session`] they run in, and the
//! [`Orchestrator`] that exposes them behind typed parameter structs.

mod context;
mod models;
mod orchestrator;
mod params;
mod plans;
mod samples;
mod tasks;
mod transaction;

pub use context::{Session, TxContext};
pub use orchestrator::Orchestrator;
pub use params::{
    DisableOutputParam, ModelFilter, NewComputePlan, NewComputeTask, NewDataSample,
    NewFailureReport, NewModel, PlanAction, PlanActionParam, PlanFilter,
    RegisterDataSamplesParam, RegisterTasksParam, SampleFilter, TaskActionKind, TaskActionParam,
    TaskFilter,
};
pub use transaction::{Request, Transaction};
