//! HTTP API for the lock server

pub mod lock;
pub mod route;

pub use route::{lock_routes, routes};
