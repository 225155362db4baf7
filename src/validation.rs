//! Input grammar checks applied before any registration touches the store.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Metadata keys, organization ids and input/output identifiers.
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").unwrap());

pub const MAX_METADATA_VALUE_LEN: usize = 100;

pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// `key` names the entity being registered, for error reporting.
pub fn validate_identifier(key: &str, what: &str, value: &str) -> Result<()> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(Error::invalid_input(
            key,
            format!("invalid {} {:?}", what, value),
        ))
    }
}

pub fn validate_org(key: &str, org: &str) -> Result<()> {
    validate_identifier(key, "organization id", org)
}

pub fn validate_metadata(key: &str, metadata: &BTreeMap<String, String>) -> Result<()> {
    for (name, value) in metadata {
        validate_identifier(key, "metadata key", name)?;
        if value.chars().count() > MAX_METADATA_VALUE_LEN {
            return Err(Error::invalid_input(
                key,
                format!(
                    "metadata value for {:?} exceeds {} characters",
                    name, MAX_METADATA_VALUE_LEN
                ),
            ));
        }
    }
    Ok(())
}
