use thiserror::Error;

use crate::core::AssetKind;

/// Failure classes reported to callers.
///
/// Client tooling decides whether to retry, report, or surface a failure
/// from the kind alone; the offending key comes from [`Error::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidTransition,
    PermissionDenied,
    InvalidInput,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::AlreadyExists => write!(f, "already_exists"),
            ErrorKind::InvalidTransition => write!(f, "invalid_transition"),
            ErrorKind::PermissionDenied => write!(f, "permission_denied"),
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} not found: {key}")]
    NotFound { kind: AssetKind, key: String },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: AssetKind, key: String },

    #[error("Invalid transition for {key}: cannot {action} from {from}")]
    InvalidTransition {
        key: String,
        from: String,
        action: String,
    },

    #[error("Permission denied for {principal} on {key}: {reason}")]
    PermissionDenied {
        principal: String,
        key: String,
        reason: String,
    },

    #[error("Invalid input for {key}: {reason}")]
    InvalidInput { key: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,
}

impl Error {
    pub fn not_found(kind: AssetKind, key: impl ToString) -> Self {
        Error::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn already_exists(kind: AssetKind, key: impl ToString) -> Self {
        Error::AlreadyExists {
            kind,
            key: key.to_string(),
        }
    }

    pub fn invalid_input(key: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn permission_denied(
        principal: impl ToString,
        key: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::PermissionDenied {
            principal: principal.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::Internal(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::NoHomeDir => ErrorKind::Internal,
        }
    }

    /// The key of the entity the failure is about, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::NotFound { key, .. }
            | Error::AlreadyExists { key, .. }
            | Error::InvalidTransition { key, .. }
            | Error::PermissionDenied { key, .. }
            | Error::InvalidInput { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
