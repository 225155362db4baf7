//! File-backed store for the command-line tool.
//!
//! The whole key space is kept in a [`MemoryStore`] and persisted as one JSON
//! object mapping keys to base64-encoded values. [`FileStore::flush`] writes
//! to a sibling temporary file and renames it over the target.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::memory::MemoryStore;
use super::{KvStore, ScanPage};
use crate::error::{Error, Result};
use crate::flog_debug;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        flog_debug!("FileStore::open path={}", path.display());
        let inner = if path.exists() {
            let raw = fs::read_to_string(path)?;
            let encoded: BTreeMap<String, String> = serde_json::from_str(&raw)?;
            let mut entries = BTreeMap::new();
            for (key, value) in encoded {
                let bytes = STANDARD.decode(value.as_bytes()).map_err(|e| {
                    Error::Internal(format!("corrupt value for {} in store file: {}", key, e))
                })?;
                entries.insert(key, bytes);
            }
            MemoryStore::from_entries(entries)
        } else {
            MemoryStore::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist pending writes. A no-op when nothing changed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded: BTreeMap<&str, String> = self
            .inner
            .entries()
            .iter()
            .map(|(key, value)| (key.as_str(), STANDARD.encode(value)))
            .collect();
        let json = serde_json::to_string_pretty(&encoded)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        flog_debug!(
            "FileStore::flush path={} entries={}",
            self.path.display(),
            self.inner.len()
        );
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.dirty = true;
        self.inner.put(key, value)
    }

    fn query_by_prefix(
        &self,
        prefix: &str,
        page_token: &str,
        page_size: usize,
    ) -> Result<ScanPage> {
        self.inner.query_by_prefix(prefix, page_token, page_size)
    }
}
