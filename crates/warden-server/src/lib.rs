//! Warden Server - distributed lock and presence broker
//!
//! This crate provides:
//! - The request handler over the lock engine
//! - The HTTP API (actix-web, JSON)
//! - Configuration, logging, metrics export and ordered startup/shutdown

pub mod api;
pub mod model;
pub mod service;
pub mod startup;
