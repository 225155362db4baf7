//! Artifacts produced or consumed by compute tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::task::TaskKey;

asset_key!(
    /// Unique identifier of a model produced by a compute task.
    ModelKey
);

asset_key!(
    /// Unique identifier of a standalone data sample.
    SampleKey
);

/// Location and integrity checksum of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressable {
    pub storage_address: String,
    pub checksum: String,
}

impl Addressable {
    pub fn new(storage_address: &str, checksum: &str) -> Self {
        Self {
            storage_address: storage_address.to_string(),
            checksum: checksum.to_string(),
        }
    }
}

/// Which organizations a permission grants access to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub authorized_ids: BTreeSet<String>,
}

impl Permission {
    pub fn public() -> Self {
        Self {
            public: true,
            authorized_ids: BTreeSet::new(),
        }
    }

    pub fn restricted<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            public: false,
            authorized_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, org: &str) -> bool {
        self.public || self.authorized_ids.contains(org)
    }
}

/// Permission policy attached to a declared task output.
///
/// `process` gates which workers may consume the output, `download` who may
/// fetch the artifact, and `disable` who besides the task owner may disable it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub process: Permission,
    #[serde(default)]
    pub download: Permission,
    #[serde(default)]
    pub disable: Permission,
}

impl Permissions {
    pub fn public() -> Self {
        Self {
            process: Permission::public(),
            download: Permission::public(),
            disable: Permission::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    #[default]
    Simple,
    Head,
    Trunk,
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelCategory::Simple => write!(f, "simple"),
            ModelCategory::Head => write!(f, "head"),
            ModelCategory::Trunk => write!(f, "trunk"),
        }
    }
}

/// A model materialized from a task output when the task reaches DONE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub key: ModelKey,
    pub compute_task_key: TaskKey,
    /// The declared output this model was produced for.
    pub output_identifier: String,
    pub category: ModelCategory,
    pub address: Addressable,
    pub permissions: Permissions,
    pub owner: String,
    pub creation_date: DateTime<Utc>,
    /// One-way: a disabled model is never enabled again.
    pub disabled: bool,
}

/// A standalone dataset registered by its owner, consumable as a task input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSample {
    pub key: SampleKey,
    pub owner: String,
    pub address: Addressable,
    pub process: Permission,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// What a failure report blames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedAssetKind {
    #[default]
    ComputeTask,
    Function,
}

impl std::fmt::Display for FailedAssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedAssetKind::ComputeTask => write!(f, "compute_task"),
            FailedAssetKind::Function => write!(f, "function"),
        }
    }
}

/// Logs of a failed task. Exactly one per FAILED task, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub compute_task_key: TaskKey,
    pub logs_address: Addressable,
    pub asset_type: FailedAssetKind,
    pub owner: String,
    pub creation_date: DateTime<Utc>,
}
