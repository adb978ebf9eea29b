//! Data models for the Warden server

pub mod config;
pub mod lock;
pub mod response;
