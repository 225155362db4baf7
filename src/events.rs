//! Append-only event log.
//!
//! Every accepted mutation appends one event per affected asset. Ordering
//! keys come from a counter persisted in the store, so replaying the same
//! transactions against the same initial state reproduces the exact same
//! log. Events are never rewritten or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::AssetKind;
use crate::error::{Error, Result};
use crate::orchestration::TxContext;
use crate::pagination::{paginate, Page, PageLimits, Pagination};
use crate::state::EntityStore;
use crate::store::{keys, KvStore};
use crate::flog_trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Disabled,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventKind::Created),
            "updated" => Ok(EventKind::Updated),
            "disabled" => Ok(EventKind::Disabled),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Global position in the log. Strictly increasing, never reused.
    pub ordering_key: u64,
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub asset_kind: AssetKind,
    pub asset_key: String,
    pub event_kind: EventKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Snapshot of the asset after the change.
    pub asset: serde_json::Value,
}

/// Event contents before an ordering key is assigned.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub asset_kind: AssetKind,
    pub asset_key: String,
    pub event_kind: EventKind,
    pub metadata: BTreeMap<String, String>,
    pub asset: serde_json::Value,
}

impl NewEvent {
    pub fn new<T: Serialize>(
        asset_kind: AssetKind,
        asset_key: impl ToString,
        event_kind: EventKind,
        asset: &T,
    ) -> Result<Self> {
        Ok(Self {
            asset_kind,
            asset_key: asset_key.to_string(),
            event_kind,
            metadata: BTreeMap::new(),
            asset: serde_json::to_value(asset)?,
        })
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Filters for [`query_events`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub asset_kind: Option<AssetKind>,
    #[serde(default)]
    pub asset_key: Option<String>,
    #[serde(default)]
    pub event_kind: Option<EventKind>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.asset_kind.map_or(true, |kind| kind == event.asset_kind)
            && self
                .asset_key
                .as_deref()
                .map_or(true, |key| key == event.asset_key)
            && self.event_kind.map_or(true, |kind| kind == event.event_kind)
    }
}

/// Last ordering key handed out, zero for an empty log.
pub fn last_ordering_key<S: KvStore + ?Sized>(store: &S) -> Result<u64> {
    match store.get(keys::EVENT_SEQ)? {
        None => Ok(0),
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| Error::Internal("corrupt event sequence counter".to_string())),
    }
}

/// Assign the next ordering key to `draft` and persist it with its index.
pub fn append<S: KvStore + ?Sized>(store: &mut S, ctx: &TxContext, draft: NewEvent) -> Result<Event> {
    let ordering_key = last_ordering_key(store)? + 1;
    let event = Event {
        ordering_key,
        tx_id: ctx.tx_id.clone(),
        timestamp: ctx.timestamp,
        asset_kind: draft.asset_kind,
        asset_key: draft.asset_key,
        event_kind: draft.event_kind,
        metadata: draft.metadata,
        asset: draft.asset,
    };

    store.save(&keys::event(ordering_key), &event)?;
    store.put(&keys::asset_event(&event.asset_key, ordering_key), Vec::new())?;
    store.put(keys::EVENT_SEQ, ordering_key.to_string().into_bytes())?;
    flog_trace!(
        "event #{} {} {} {}",
        ordering_key,
        event.event_kind,
        event.asset_kind,
        event.asset_key
    );
    Ok(event)
}

/// Events in ordering-key order. An asset key filter walks that asset's
/// index instead of the whole log; the page token format is the same.
pub fn query_events<S: KvStore + ?Sized>(
    store: &S,
    filter: &EventFilter,
    pagination: &Pagination,
    limits: &PageLimits,
) -> Result<Page<Event>> {
    match &filter.asset_key {
        Some(asset_key) => paginate(
            store,
            &keys::asset_events_prefix(asset_key),
            pagination,
            limits,
            |ordering, _| {
                let event: Event = store
                    .load(&format!("{}{}", keys::EVENT_PREFIX, ordering))?
                    .ok_or_else(|| {
                        Error::Internal(format!("dangling event index entry {}", ordering))
                    })?;
                Ok(filter.matches(&event).then_some(event))
            },
        ),
        None => paginate(store, keys::EVENT_PREFIX, pagination, limits, |_, bytes| {
            let event: Event = serde_json::from_slice(bytes)?;
            Ok(filter.matches(&event).then_some(event))
        }),
    }
}
