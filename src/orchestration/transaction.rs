//! Recorded transactions: the unit a ledger replays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::TxContext;
use super::orchestrator::Orchestrator;
use super::params::{
    DisableOutputParam, NewComputePlan, PlanActionParam, RegisterDataSamplesParam,
    RegisterTasksParam, TaskActionParam,
};
use crate::error::Result;
use crate::store::KvStore;

/// Mutating operations, one variant per parameter struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Request {
    RegisterPlan(NewComputePlan),
    ApplyPlanAction(PlanActionParam),
    RegisterTasks(RegisterTasksParam),
    ApplyTaskAction(TaskActionParam),
    DisableOutput(DisableOutputParam),
    RegisterDataSamples(RegisterDataSamplesParam),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::RegisterPlan(_) => "register_plan",
            Request::ApplyPlanAction(_) => "apply_plan_action",
            Request::RegisterTasks(_) => "register_tasks",
            Request::ApplyTaskAction(_) => "apply_task_action",
            Request::DisableOutput(_) => "disable_output",
            Request::RegisterDataSamples(_) => "register_data_samples",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Authenticated organization submitting the request.
    pub principal: String,
    pub request: Request,
}

impl Transaction {
    pub fn context(&self) -> TxContext {
        TxContext::new(self.tx_id.clone(), self.timestamp)
    }
}

impl<S: KvStore> Orchestrator<S> {
    /// Execute a recorded transaction and return its JSON-encoded result.
    pub fn submit(&mut self, tx: &Transaction) -> Result<serde_json::Value> {
        let ctx = tx.context();
        let principal = tx.principal.as_str();
        let value = match tx.request.clone() {
            Request::RegisterPlan(param) => {
                serde_json::to_value(self.register_plan(&ctx, principal, param)?)?
            }
            Request::ApplyPlanAction(param) => {
                serde_json::to_value(self.apply_plan_action(&ctx, principal, param)?)?
            }
            Request::RegisterTasks(param) => {
                serde_json::to_value(self.register_tasks(&ctx, principal, param)?)?
            }
            Request::ApplyTaskAction(param) => {
                serde_json::to_value(self.apply_task_action(&ctx, principal, param)?)?
            }
            Request::DisableOutput(param) => {
                serde_json::to_value(self.disable_output(&ctx, principal, param)?)?
            }
            Request::RegisterDataSamples(param) => {
                serde_json::to_value(self.register_data_samples(&ctx, principal, param)?)?
            }
        };
        Ok(value)
    }
}
