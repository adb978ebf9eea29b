//! Lock record data model

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a record is used for. Fixed when the record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Mutual exclusion of a task or leader role
    #[default]
    Lock,
    /// Liveness of an ephemeral participant
    Presence,
}

impl LockKind {
    pub const ALL: [LockKind; 2] = [LockKind::Lock, LockKind::Presence];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Lock => "lock",
            LockKind::Presence => "presence",
        }
    }
}

impl Display for LockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lock" => Ok(LockKind::Lock),
            "presence" => Ok(LockKind::Presence),
            other => Err(format!("unknown lock kind '{}'", other)),
        }
    }
}

/// The caller-supplied part of a record: what is locked, by whom, and why.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resource {
    pub key: String,
    pub owner: String,
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default)]
    pub kind: LockKind,
}

impl Resource {
    pub fn new(key: impl Into<String>, owner: impl Into<String>, kind: LockKind) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            value: Vec::new(),
            kind,
        }
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }
}

/// A persisted lock or presence record, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub key: String,
    pub owner: String,
    pub value: Vec<u8>,
    pub kind: LockKind,
    /// Incremented on every accepted mutation of `key`, never reused
    pub modification_index: i64,
    pub ttl_ms: i64,
    /// Epoch millis; `None` means the record never expires
    pub deadline_ms: Option<i64>,
}

impl LockRecord {
    /// A record is expired once its deadline has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.deadline_ms, Some(deadline) if deadline < now_ms)
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Remaining lifetime in milliseconds, zero once expired.
    pub fn remaining_ttl_ms(&self, now_ms: i64) -> Option<i64> {
        self.deadline_ms.map(|deadline| (deadline - now_ms).max(0))
    }

    pub fn resource(&self) -> Resource {
        Resource {
            key: self.key.clone(),
            owner: self.owner.clone(),
            value: self.value.clone(),
            kind: self.kind,
        }
    }
}

/// Deadline for a write at `now_ms`; a zero ttl never expires.
pub fn deadline_for(now_ms: i64, ttl_ms: i64) -> Option<i64> {
    (ttl_ms > 0).then(|| now_ms.saturating_add(ttl_ms))
}
