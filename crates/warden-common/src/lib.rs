//! Warden Common - Shared types, errors, and utilities
//!
//! This crate provides:
//! - The lock/presence record model
//! - The lock engine error taxonomy and API error codes
//! - The shared clock abstraction
//! - Input validation helpers

pub mod clock;
pub mod error;
pub mod model;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, LockError};
pub use model::{LockKind, LockRecord, Resource, deadline_for};

/// Result alias used throughout the lock engine
pub type LockResult<T> = std::result::Result<T, LockError>;
