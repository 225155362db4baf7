//! Deterministic paged listing over key-ordered entity families.
//!
//! Listings always walk a family in primary-key order, whatever the filter.
//! The continuation token is the base64 encoding of the last primary key
//! returned, so resuming never repeats an entry and entries inserted behind
//! the cursor cannot shift later pages. A page without a token is the last.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::KvStore;

/// Entries fetched from the store per scan round trip.
const SCAN_BATCH: usize = 128;

/// Page size bounds, usually taken from [`crate::config::Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl PageLimits {
    pub fn new(default_page_size: usize, max_page_size: usize) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Zero means "default"; anything above the maximum is clamped.
    pub fn resolve(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

/// Requested page: size and opaque token (empty means start of listing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page_size: usize,
    #[serde(default)]
    pub page_token: String,
}

impl Pagination {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            page_token: String::new(),
        }
    }

    pub fn after(page_size: usize, page_token: &str) -> Self {
        Self {
            page_size,
            page_token: page_token.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Absent on the last page.
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

pub fn encode_token(last_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_key.as_bytes())
}

pub fn decode_token(token: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| Error::invalid_input(token, "malformed page token"))?;
    String::from_utf8(bytes).map_err(|_| Error::invalid_input(token, "malformed page token"))
}

/// List one page of the entries under `prefix`.
///
/// `load` receives the primary key (the store key minus `prefix`) and the
/// stored value, and returns `None` for entries the filter rejects.
pub fn paginate<S, T, F>(
    store: &S,
    prefix: &str,
    pagination: &Pagination,
    limits: &PageLimits,
    mut load: F,
) -> Result<Page<T>>
where
    S: KvStore + ?Sized,
    F: FnMut(&str, &[u8]) -> Result<Option<T>>,
{
    let page_size = limits.resolve(pagination.page_size);
    let mut cursor = if pagination.page_token.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, decode_token(&pagination.page_token)?)
    };

    let mut items = Vec::with_capacity(page_size);
    let mut last_key = String::new();
    loop {
        let (entries, next) = store.query_by_prefix(prefix, &cursor, SCAN_BATCH)?;
        for (key, value) in entries {
            let primary = key.strip_prefix(prefix).unwrap_or(&key);
            let Some(item) = load(primary, &value)? else {
                continue;
            };
            if items.len() == page_size {
                // One more match exists past this page.
                return Ok(Page {
                    items,
                    next_page_token: Some(encode_token(&last_key)),
                });
            }
            last_key = primary.to_string();
            items.push(item);
        }
        if next.is_empty() {
            break;
        }
        cursor = next;
    }

    Ok(Page {
        items,
        next_page_token: None,
    })
}
