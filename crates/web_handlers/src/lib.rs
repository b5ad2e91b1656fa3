//! # Web Handlers for the Court Monitor
//!
//! This crate provides the HTTP endpoints of the court monitor: liveness, on-demand
//! checks and a read-only view of the current slots.

/// Handlers for monitor API endpoints
mod monitor_handlers;
pub use monitor_handlers::*;
