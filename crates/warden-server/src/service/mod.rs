//! Business logic services

pub mod lock_handler;

pub use lock_handler::LockHandler;
