//! Request and response bodies of the lock API

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use validator::Validate;
use warden_common::{LockError, LockKind, LockRecord, LockResult, Resource};

/// Body of acquire and renew calls
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct AcquireRequest {
    #[validate(length(min = 1, max = 255))]
    pub key: String,
    #[validate(length(min = 1, max = 255))]
    pub owner: String,
    /// Base64-encoded opaque payload
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub kind: LockKind,
    pub ttl_ms: i64,
}

impl AcquireRequest {
    pub fn ttl(&self) -> LockResult<Duration> {
        if self.ttl_ms <= 0 {
            return Err(LockError::InvalidTtl(self.ttl_ms));
        }
        Ok(Duration::from_millis(self.ttl_ms as u64))
    }

    pub fn to_resource(&self) -> LockResult<Resource> {
        let value = match &self.value {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| LockError::InvalidInput(format!("value is not valid base64: {}", e)))?,
            None => Vec::new(),
        };
        Ok(Resource::new(self.key.clone(), self.owner.clone(), self.kind).with_value(value))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct ReleaseRequest {
    #[validate(length(min = 1, max = 255))]
    pub key: String,
    #[validate(length(min = 1, max = 255))]
    pub owner: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FetchQuery {
    pub kind: Option<LockKind>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WatchQuery {
    pub kind: Option<LockKind>,
    /// Index the caller last saw; absent means the caller saw no record.
    pub index: Option<i64>,
    pub wait_ms: Option<u64>,
}

/// Lock record as returned by the API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecordView {
    pub key: String,
    pub owner: String,
    pub value: String,
    pub kind: LockKind,
    pub modification_index: i64,
    pub ttl_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<i64>,
    /// RFC 3339 rendering of `deadline_ms`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

impl From<LockRecord> for LockRecordView {
    fn from(record: LockRecord) -> Self {
        let deadline = record
            .deadline_ms
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|d| d.to_rfc3339());
        LockRecordView {
            key: record.key,
            owner: record.owner,
            value: STANDARD.encode(&record.value),
            kind: record.kind,
            modification_index: record.modification_index,
            ttl_ms: record.ttl_ms,
            deadline_ms: record.deadline_ms,
            deadline,
        }
    }
}

/// Result of a watch call: the current record, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchView {
    pub record: Option<LockRecordView>,
}

/// Turn validator output into an engine input error.
pub fn validate_body(body: &impl Validate) -> LockResult<()> {
    body.validate()
        .map_err(|e| LockError::InvalidInput(e.to_string().replace('\n', "; ")))
}
