//! Input validation for lock requests
//!
//! Checks run before any store call, so invalid input never reaches the
//! database.

use std::time::Duration;

use crate::error::LockError;
use crate::model::Resource;

/// Maximum length for a lock key
pub const MAX_KEY_LENGTH: usize = 255;

/// Maximum length for an owner id
pub const MAX_OWNER_LENGTH: usize = 255;

/// Maximum size of a record value, the capacity of the `value` blob column
pub const MAX_VALUE_LENGTH: usize = 65_535;

/// Validate a lock key.
///
/// Key must:
/// - Not be empty
/// - Not exceed MAX_KEY_LENGTH bytes
/// - Not contain control characters
pub fn validate_key(key: &str) -> Result<(), LockError> {
    if key.is_empty() {
        return Err(LockError::InvalidInput("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(LockError::InvalidInput(format!(
            "key exceeds {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(LockError::InvalidInput(
            "key must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate an owner id
pub fn validate_owner(owner: &str) -> Result<(), LockError> {
    if owner.trim().is_empty() {
        return Err(LockError::InvalidInput(
            "owner must not be empty".to_string(),
        ));
    }
    if owner.len() > MAX_OWNER_LENGTH {
        return Err(LockError::InvalidInput(format!(
            "owner exceeds {} bytes",
            MAX_OWNER_LENGTH
        )));
    }
    Ok(())
}

/// Validate an acquisition ttl and convert it to milliseconds.
pub fn validate_ttl(ttl: Duration) -> Result<i64, LockError> {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    if ttl_ms <= 0 {
        return Err(LockError::InvalidTtl(ttl_ms));
    }
    Ok(ttl_ms)
}

/// Validate everything an acquisition needs.
pub fn validate_resource(resource: &Resource) -> Result<(), LockError> {
    validate_key(&resource.key)?;
    validate_owner(&resource.owner)?;
    if resource.value.len() > MAX_VALUE_LENGTH {
        return Err(LockError::InvalidInput(format!(
            "value exceeds {} bytes",
            MAX_VALUE_LENGTH
        )));
    }
    Ok(())
}
