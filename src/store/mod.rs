//! Ordered key-value storage consumed by the engine.
//!
//! The hosting ledger provides the real store; the engine only relies on the
//! narrow [`KvStore`] contract: point reads, writes, and key-ordered prefix
//! scans resumed from the last returned key. [`StagedStore`] layers one
//! action's writes over a base store so the action commits all or nothing.
//!
//! ## Implementations
//!
//! - [`memory::MemoryStore`]: `BTreeMap`-backed, for tests and embedding
//! - [`file::FileStore`]: a memory store persisted as one JSON document

pub mod file;
pub mod keys;
pub mod memory;

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::Result;

/// One page of a prefix scan: entries in ascending key order plus the key to
/// resume after, empty when the scan reached the end of the prefix.
pub type ScanPage = (Vec<(String, Vec<u8>)>, String);

pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Entries whose key starts with `prefix` and sorts strictly after
    /// `page_token` (an empty token starts at the beginning of the prefix).
    ///
    /// Returns at most `page_size` entries. The next token is the last key
    /// returned when the page is full, and empty otherwise.
    fn query_by_prefix(&self, prefix: &str, page_token: &str, page_size: usize)
        -> Result<ScanPage>;
}

/// Lower bound of a scan, shared by the implementations.
pub(crate) fn scan_start<'a>(prefix: &'a str, page_token: &'a str) -> Bound<&'a str> {
    if page_token.is_empty() || page_token < prefix {
        Bound::Included(prefix)
    } else {
        Bound::Excluded(page_token)
    }
}

/// Writes of a single action buffered over a read-only base store.
///
/// Reads observe the base plus every write staged so far. Nothing reaches
/// the base until [`StagedStore::into_writes`] is applied by the caller;
/// dropping the overlay discards the action.
pub struct StagedStore<'a, S: KvStore + ?Sized> {
    base: &'a S,
    writes: BTreeMap<String, Vec<u8>>,
}

impl<'a, S: KvStore + ?Sized> StagedStore<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    pub fn staged_count(&self) -> usize {
        self.writes.len()
    }

    /// Buffered writes in key order.
    pub fn into_writes(self) -> BTreeMap<String, Vec<u8>> {
        self.writes
    }
}

impl<S: KvStore + ?Sized> KvStore for StagedStore<'_, S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => self.base.get(key),
        }
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.writes.insert(key.to_string(), value);
        Ok(())
    }

    fn query_by_prefix(
        &self,
        prefix: &str,
        page_token: &str,
        page_size: usize,
    ) -> Result<ScanPage> {
        // The first `page_size` keys of the union are among the first
        // `page_size` base keys and the staged keys in range.
        let (base_entries, _) = self.base.query_by_prefix(prefix, page_token, page_size)?;

        let mut merged: BTreeMap<String, Vec<u8>> = base_entries.into_iter().collect();
        for (key, value) in self
            .writes
            .range::<str, _>((scan_start(prefix, page_token), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            merged.insert(key.clone(), value.clone());
        }

        let entries: Vec<(String, Vec<u8>)> = merged.into_iter().take(page_size).collect();
        let next = if entries.len() == page_size {
            entries.last().map(|(key, _)| key.clone()).unwrap_or_default()
        } else {
            String::new()
        };
        Ok((entries, next))
    }
}
