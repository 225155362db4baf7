//! Core domain models for federated compute orchestration.
//!
//! Compute plans group compute tasks into a dependency DAG. Tasks consume
//! outputs of their parents or standalone data samples, and produce models
//! once done. Everything here is plain data plus the pure rules that govern
//! it (status transitions, plan aggregation, registration ordering); store
//! access lives in [`crate::state`] and [`crate::orchestration`].

use serde::{Deserialize, Serialize};

/// Declares a UUID-backed key newtype with display and parsing support.
macro_rules! asset_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Return first 8 characters of the UUID for display.
            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }
    };
}

pub mod asset;
pub mod dag;
pub mod plan;
pub mod task;

pub use asset::{
    Addressable, DataSample, FailedAssetKind, FailureReport, Model, ModelCategory, ModelKey,
    Permission, Permissions, SampleKey,
};
pub use dag::RegistrationGraph;
pub use plan::{ComputePlan, PlanKey, PlanStatus, TaskStatusCounts};
pub use task::{ComputeTask, TaskAction, TaskInput, TaskKey, TaskOutput, TaskStatus};

/// The entity families tracked by the event log and error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    ComputePlan,
    ComputeTask,
    Model,
    DataSample,
    FailureReport,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::ComputePlan => write!(f, "compute_plan"),
            AssetKind::ComputeTask => write!(f, "compute_task"),
            AssetKind::Model => write!(f, "model"),
            AssetKind::DataSample => write!(f, "data_sample"),
            AssetKind::FailureReport => write!(f, "failure_report"),
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "compute_plan" => Ok(AssetKind::ComputePlan),
            "compute_task" => Ok(AssetKind::ComputeTask),
            "model" => Ok(AssetKind::Model),
            "data_sample" => Ok(AssetKind::DataSample),
            "failure_report" => Ok(AssetKind::FailureReport),
            other => Err(format!("unknown asset kind: {}", other)),
        }
    }
}
