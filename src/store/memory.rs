//! In-memory store.
//!
//! [`MemoryStore`] keeps every entry in a `BTreeMap`, which gives the
//! key-ordered scans the engine's pagination depends on.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::{scan_start, KvStore, ScanPage};
use crate::error::Result;
use crate::flog_trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<u8>>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        flog_trace!("MemoryStore::put key={} bytes={}", key, value.len());
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn query_by_prefix(
        &self,
        prefix: &str,
        page_token: &str,
        page_size: usize,
    ) -> Result<ScanPage> {
        let entries: Vec<(String, Vec<u8>)> = self
            .entries
            .range::<str, _>((scan_start(prefix, page_token), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(page_size)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let next = if page_size > 0 && entries.len() == page_size {
            entries.last().map(|(key, _)| key.clone()).unwrap_or_default()
        } else {
            String::new()
        };
        Ok((entries, next))
    }
}
