//! HTTP response types for Warden server

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use serde::{Deserialize, Serialize};
use warden_common::LockError;
use warden_common::error::SUCCESS;

/// Generic result wrapper for successful API responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Result<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> Result<T> {
    pub fn success(data: T) -> Result<T> {
        Result::<T> {
            code: SUCCESS.code,
            message: SUCCESS.message.to_string(),
            data,
        }
    }

    pub fn http_success(data: impl Serialize) -> HttpResponse {
        HttpResponse::Ok().json(Result::success(data))
    }
}

/// Error body for failed lock calls
///
/// Conflict errors carry the current holder and index so the caller can
/// decide whether and when to retry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub code: i32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_index: Option<i64>,
}

impl ErrorResult {
    pub fn status(err: &LockError) -> StatusCode {
        match err {
            LockError::InvalidInput(_) | LockError::InvalidTtl(_) => StatusCode::BAD_REQUEST,
            LockError::NotOwner { .. } => StatusCode::FORBIDDEN,
            LockError::NotFound { .. } => StatusCode::NOT_FOUND,
            LockError::AlreadyHeld { .. } | LockError::KindMismatch { .. } => {
                StatusCode::CONFLICT
            }
            LockError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LockError::StoreFatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_response(err: &LockError) -> HttpResponse {
        HttpResponseBuilder::new(Self::status(err)).json(ErrorResult::from(err))
    }
}

impl From<&LockError> for ErrorResult {
    fn from(err: &LockError) -> Self {
        let (owner, modification_index) = match err {
            LockError::AlreadyHeld {
                owner,
                modification_index,
                ..
            } => (Some(owner.clone()), Some(*modification_index)),
            LockError::NotOwner { current_owner, .. } => (current_owner.clone(), None),
            _ => (None, None),
        };
        ErrorResult {
            code: err.error_code().code,
            error: err.kind().to_string(),
            message: err.to_string(),
            owner,
            modification_index,
        }
    }
}
