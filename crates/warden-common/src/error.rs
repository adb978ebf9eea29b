//! Error types and error codes for Warden
//!
//! This module defines:
//! - `LockError`: the per-call error taxonomy of the lock engine
//! - `ErrorCode`: structured error codes for API responses

use serde::{Deserialize, Serialize};

use crate::model::LockKind;

/// Errors produced by the lock engine.
///
/// Every variant carries the context a caller needs to decide whether and
/// when to retry (current owner, current modification index).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid ttl {0}ms: ttl must be greater than zero")]
    InvalidTtl(i64),

    #[error("lock '{key}' is already held by '{owner}'")]
    AlreadyHeld {
        key: String,
        owner: String,
        modification_index: i64,
    },

    #[error("'{owner}' does not hold lock '{key}'")]
    NotOwner {
        key: String,
        owner: String,
        current_owner: Option<String>,
    },

    #[error("lock '{key}' is a {existing} record, not a {requested} record")]
    KindMismatch {
        key: String,
        existing: LockKind,
        requested: LockKind,
    },

    #[error("lock '{key}' not found")]
    NotFound { key: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store failure: {0}")]
    StoreFatal(String),
}

impl LockError {
    pub fn not_found(key: impl Into<String>) -> Self {
        LockError::NotFound { key: key.into() }
    }

    /// Stable tag used in API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            LockError::InvalidInput(_) => "invalid_input",
            LockError::InvalidTtl(_) => "invalid_ttl",
            LockError::AlreadyHeld { .. } => "already_held",
            LockError::NotOwner { .. } => "not_owner",
            LockError::KindMismatch { .. } => "kind_mismatch",
            LockError::NotFound { .. } => "not_found",
            LockError::StoreUnavailable(_) => "store_unavailable",
            LockError::StoreFatal(_) => "store_fatal",
        }
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            LockError::InvalidInput(_) => INVALID_INPUT,
            LockError::InvalidTtl(_) => INVALID_TTL,
            LockError::AlreadyHeld { .. } => LOCK_ALREADY_HELD,
            LockError::NotOwner { .. } => LOCK_NOT_OWNER,
            LockError::KindMismatch { .. } => LOCK_KIND_MISMATCH,
            LockError::NotFound { .. } => RESOURCE_NOT_FOUND,
            LockError::StoreUnavailable(_) => STORE_UNAVAILABLE,
            LockError::StoreFatal(_) => STORE_FATAL,
        }
    }

    /// Whether the caller may retry the same call later.
    ///
    /// Conflicts are retryable after backoff; input errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::AlreadyHeld { .. } | LockError::StoreUnavailable(_)
        )
    }

    /// Whether the error must take the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LockError::StoreFatal(_))
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const INVALID_INPUT: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "invalid input",
};

pub const INVALID_TTL: ErrorCode<'static> = ErrorCode {
    code: 10001,
    message: "invalid ttl",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
};

pub const LOCK_ALREADY_HELD: ErrorCode<'static> = ErrorCode {
    code: 24000,
    message: "lock already held",
};

pub const LOCK_NOT_OWNER: ErrorCode<'static> = ErrorCode {
    code: 24001,
    message: "caller does not own the lock",
};

pub const LOCK_KIND_MISMATCH: ErrorCode<'static> = ErrorCode {
    code: 24002,
    message: "lock kind mismatch",
};

pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "store unavailable",
};

pub const STORE_FATAL: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "store failure",
};
