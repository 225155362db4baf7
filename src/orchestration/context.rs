//! Per-action execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::{AssetKind, PlanKey};
use crate::error::Result;
use crate::events::{self, Event, EventKind, NewEvent};
use crate::state::EntityStore;
use crate::store::{KvStore, StagedStore};
use crate::flog_debug;

/// Logical position of the enclosing ledger transaction.
///
/// `timestamp` is the only clock the engine reads: creation dates,
/// cancelation dates and event timestamps all come from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TxContext {
    pub fn new(tx_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            tx_id: tx_id.into(),
            timestamp,
        }
    }
}

/// One mutating action in flight.
///
/// Reads and writes go through a [`StagedStore`] so the action observes its
/// own writes while the base store stays untouched until commit.
pub struct Session<'a, S: KvStore + ?Sized> {
    pub(crate) store: StagedStore<'a, S>,
    pub(crate) ctx: &'a TxContext,
    pub(crate) principal: &'a str,
    touched_plans: BTreeSet<PlanKey>,
    events: Vec<Event>,
}

impl<'a, S: KvStore + ?Sized> Session<'a, S> {
    pub fn new(base: &'a S, ctx: &'a TxContext, principal: &'a str) -> Self {
        Self {
            store: StagedStore::new(base),
            ctx,
            principal,
            touched_plans: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, draft: NewEvent) -> Result<()> {
        let event = events::append(&mut self.store, self.ctx, draft)?;
        self.events.push(event);
        Ok(())
    }

    /// The plan's status projection is refreshed when the action finishes.
    pub fn touch_plan(&mut self, plan: PlanKey) {
        self.touched_plans.insert(plan);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Refresh touched plan projections and hand back the staged writes.
    pub fn finish(mut self) -> Result<(BTreeMap<String, Vec<u8>>, Vec<Event>)> {
        let touched = std::mem::take(&mut self.touched_plans);
        for plan_key in touched {
            self.refresh_plan_status(&plan_key)?;
        }
        flog_debug!(
            "session {} finished: {} writes, {} events",
            self.ctx.tx_id,
            self.store.staged_count(),
            self.events.len()
        );
        Ok((self.store.into_writes(), self.events))
    }

    fn refresh_plan_status(&mut self, plan_key: &PlanKey) -> Result<()> {
        let mut plan = self.store.get_plan(plan_key)?;
        let status = self
            .store
            .plan_task_counts(plan_key)?
            .plan_status(plan.is_canceled());
        if status == plan.status {
            return Ok(());
        }

        let previous = plan.status;
        plan.status = status;
        self.store.put_plan(&plan)?;
        self.emit(
            NewEvent::new(AssetKind::ComputePlan, plan.key, EventKind::Updated, &plan)?
                .with_metadata("previous_status", previous)
                .with_metadata("status", status),
        )
    }
}
